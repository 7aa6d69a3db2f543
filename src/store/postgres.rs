//! Postgres store over a pooled sqlx connection.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;
use uuid::Uuid;

use super::{Database, OrderSummary, StoreError, StoreResult, Transaction};
use crate::domain::aggregates::{
    CartItem, CartLine, Coupon, CouponKind, Order, OrderItem, OrderStatus, Position, Product, ProductImage, Role, Ticket, User,
};
use crate::domain::value_objects::{CouponCode, MonthYear, Quantity};

#[derive(Clone)]
pub struct PgDatabase { pool: PgPool }

impl PgDatabase {
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| StoreError::Database(e.into()))
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

pub struct PgTransaction { tx: sqlx::Transaction<'static, Postgres> }

fn map_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        let what = db.constraint().unwrap_or("constraint").to_string();
        if db.is_unique_violation() { return StoreError::UniqueViolation(what); }
        if db.is_foreign_key_violation() { return StoreError::ForeignKeyViolation(what); }
    }
    StoreError::Database(err)
}

fn quantity(value: i32) -> StoreResult<Quantity> {
    Quantity::new(i64::from(value)).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn quantity_param(q: Quantity) -> i32 { i32::try_from(q.value()).unwrap_or(i32::MAX) }

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid, nome: String, email: String, senha_hash: String, perfil: String,
    data_nascimento: Option<NaiveDate>, telefone: Option<String>, criado_em: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;
    fn try_from(r: UserRow) -> StoreResult<Self> {
        Ok(User {
            id: r.id, name: r.nome, email: r.email, password_hash: r.senha_hash,
            role: r.perfil.parse::<Role>().map_err(StoreError::Corrupt)?,
            birth_date: r.data_nascimento, phone: r.telefone, created_at: r.criado_em,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow { id: Uuid, nome: String, preco: Decimal, status: String, categoria: String, descricao: String, criado_em: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct ImageRow { id: Uuid, produto_id: Uuid, tipo: String, caminho: String }

impl ImageRow {
    fn into_image(self) -> StoreResult<ProductImage> {
        match self.tipo.as_str() {
            "url" => Ok(ProductImage::Url { id: self.id, url: self.caminho }),
            "upload" => Ok(ProductImage::Upload { id: self.id }),
            other => Err(StoreError::Corrupt(format!("unknown image type '{other}'"))),
        }
    }
}

impl ProductRow {
    fn into_product(self, images: Vec<ProductImage>) -> StoreResult<Product> {
        Ok(Product {
            id: self.id, name: self.nome, price: self.preco, status: self.status.parse().map_err(StoreError::Corrupt)?,
            category: self.categoria, description: self.descricao, images, created_at: self.criado_em,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid, codigo: String, usuario_id: Uuid, mes_ano: Option<String>, valor_desconto: Decimal, tipo: String,
    utilizado: bool, data_utilizacao: Option<DateTime<Utc>>, criado_em: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = StoreError;
    fn try_from(r: CouponRow) -> StoreResult<Self> {
        Ok(Coupon {
            id: r.id, code: CouponCode::parse(&r.codigo).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            owner_id: r.usuario_id, month_year: r.mes_ano, value: r.valor_desconto, kind: CouponKind::from_tag(&r.tipo),
            used: r.utilizado, used_at: r.data_utilizacao, created_at: r.criado_em,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, usuario_id: Uuid, status: String, data: NaiveDate, valor: Decimal, posicao: String,
    cupom_id: Option<Uuid>, atualizado: bool, criado_em: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> StoreResult<Self> {
        Ok(Order {
            id: r.id, user_id: r.usuario_id,
            status: r.status.parse::<OrderStatus>().map_err(StoreError::Corrupt)?,
            position: r.posicao.parse::<Position>().map_err(StoreError::Corrupt)?,
            date: r.data, total: r.valor, coupon_id: r.cupom_id, updated: r.atualizado, created_at: r.criado_em,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow { id: Uuid, pedido_id: Uuid, descricao: String, whatsapp: String, email: String, data_abertura: DateTime<Utc> }

impl From<TicketRow> for Ticket {
    fn from(r: TicketRow) -> Self {
        Ticket { id: r.id, order_id: r.pedido_id, description: r.descricao, whatsapp: r.whatsapp, email: r.email, opened_at: r.data_abertura }
    }
}

const USER_COLUMNS: &str = "id, nome, email, senha_hash, perfil, data_nascimento, telefone, criado_em";
const COUPON_COLUMNS: &str = "id, codigo, usuario_id, mes_ano, valor_desconto, tipo, utilizado, data_utilizacao, criado_em";
const ORDER_COLUMNS: &str = "id, usuario_id, status, data, valor, posicao, cupom_id, atualizado, criado_em";
const TICKET_COLUMNS: &str = "id, pedido_id, descricao, whatsapp, email, data_abertura";

impl PgTransaction {
    async fn images_for(&mut self, product_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, Vec<ProductImage>>> {
        let rows = sqlx::query_as::<_, ImageRow>(
            "SELECT id, produto_id, tipo, caminho FROM imagem_produto WHERE produto_id = ANY($1) ORDER BY id",
        )
        .bind(product_ids)
        .fetch_all(&mut *self.tx).await?;
        let mut by_product: HashMap<Uuid, Vec<ProductImage>> = HashMap::new();
        for row in rows {
            let product_id = row.produto_id;
            by_product.entry(product_id).or_default().push(row.into_image()?);
        }
        Ok(by_product)
    }

    /// Existing image ids are left untouched.
    async fn insert_image(&mut self, product_id: Uuid, image: &ProductImage) -> StoreResult<()> {
        let path = match image { ProductImage::Url { url, .. } => url.clone(), ProductImage::Upload { id } => id.to_string() };
        sqlx::query("INSERT INTO imagem_produto (id, produto_id, tipo, caminho) VALUES ($1, $2, $3, $4) ON CONFLICT (id) DO NOTHING")
            .bind(image.id()).bind(product_id).bind(image.kind()).bind(path)
            .execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(())
    }

    async fn products_with_images(&mut self, rows: Vec<ProductRow>) -> StoreResult<Vec<Product>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut images = self.images_for(&ids).await?;
        rows.into_iter().map(|r| {
            let imgs = images.remove(&r.id).unwrap_or_default();
            r.into_product(imgs)
        }).collect()
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PgTransaction { tx } = *self;
        tx.commit().await.map_err(map_err)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let PgTransaction { tx } = *self;
        tx.rollback().await.map_err(map_err)
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        sqlx::query("INSERT INTO usuario (id, nome, email, senha_hash, perfil, data_nascimento, telefone, criado_em) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(user.id).bind(&user.name).bind(&user.email).bind(&user.password_hash).bind(user.role.as_str())
            .bind(user.birth_date).bind(&user.phone).bind(user.created_at)
            .execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(())
    }

    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM usuario WHERE id = $1"))
            .bind(id).fetch_optional(&mut *self.tx).await?.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM usuario WHERE email = $1"))
            .bind(email).fetch_optional(&mut *self.tx).await?.map(User::try_from).transpose()
    }

    async fn clients_born_in(&mut self, month: u32) -> StoreResult<Vec<User>> {
        let month = i32::try_from(month).map_err(|_| StoreError::Corrupt(format!("month {month}")))?;
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM usuario WHERE perfil = 'Cliente' AND EXTRACT(MONTH FROM data_nascimento)::INT = $1 ORDER BY nome"
        ))
        .bind(month).fetch_all(&mut *self.tx).await?
        .into_iter().map(User::try_from).collect()
    }

    async fn update_user_profile(&mut self, user: &User) -> StoreResult<u64> {
        let done = sqlx::query("UPDATE usuario SET nome = $2, email = $3, telefone = $4 WHERE id = $1")
            .bind(user.id).bind(&user.name).bind(&user.email).bind(&user.phone)
            .execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(done.rows_affected())
    }

    async fn set_password_hash(&mut self, id: Uuid, hash: &str) -> StoreResult<u64> {
        let done = sqlx::query("UPDATE usuario SET senha_hash = $2 WHERE id = $1")
            .bind(id).bind(hash).execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(done.rows_affected())
    }

    async fn count_users(&mut self) -> StoreResult<u64> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM usuario").fetch_one(&mut *self.tx).await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        sqlx::query("INSERT INTO produto (id, nome, preco, status, categoria, descricao, criado_em) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(product.id).bind(&product.name).bind(product.price).bind(product.status.as_str())
            .bind(&product.category).bind(&product.description).bind(product.created_at)
            .execute(&mut *self.tx).await.map_err(map_err)?;
        for image in &product.images {
            self.insert_image(product.id, image).await?;
        }
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> StoreResult<u64> {
        let done = sqlx::query("UPDATE produto SET nome = $2, preco = $3, status = $4, categoria = $5, descricao = $6 WHERE id = $1")
            .bind(product.id).bind(&product.name).bind(product.price).bind(product.status.as_str())
            .bind(&product.category).bind(&product.description)
            .execute(&mut *self.tx).await.map_err(map_err)?;
        if done.rows_affected() == 0 {
            return Ok(0);
        }
        let keep: Vec<Uuid> = product.images.iter().map(ProductImage::id).collect();
        sqlx::query("DELETE FROM imagem_produto WHERE produto_id = $1 AND NOT (id = ANY($2))")
            .bind(product.id).bind(&keep)
            .execute(&mut *self.tx).await.map_err(map_err)?;
        for image in &product.images {
            self.insert_image(product.id, image).await?;
        }
        Ok(done.rows_affected())
    }

    async fn list_products(&mut self) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT id, nome, preco, status, categoria, descricao, criado_em FROM produto ORDER BY id DESC")
            .fetch_all(&mut *self.tx).await?;
        self.products_with_images(rows).await
    }

    async fn find_product(&mut self, id: Uuid) -> StoreResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT id, nome, preco, status, categoria, descricao, criado_em FROM produto WHERE id = $1")
            .bind(id).fetch_optional(&mut *self.tx).await?;
        match row {
            Some(row) => Ok(self.products_with_images(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn delete_product(&mut self, id: Uuid) -> StoreResult<u64> {
        let done = sqlx::query("DELETE FROM produto WHERE id = $1").bind(id).execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(done.rows_affected())
    }

    async fn find_cart(&mut self, user_id: Uuid) -> StoreResult<Option<Uuid>> {
        Ok(sqlx::query_scalar::<_, Uuid>("SELECT id FROM carrinhos WHERE usuario_id = $1")
            .bind(user_id).fetch_optional(&mut *self.tx).await?)
    }

    async fn insert_cart(&mut self, cart_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        sqlx::query("INSERT INTO carrinhos (id, usuario_id) VALUES ($1, $2)")
            .bind(cart_id).bind(user_id).execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(())
    }

    async fn find_cart_item(&mut self, cart_id: Uuid, product_id: Uuid) -> StoreResult<Option<CartItem>> {
        let row = sqlx::query_as::<_, (Uuid, i32)>("SELECT id, quantidade FROM carrinho_itens WHERE carrinho_id = $1 AND produto_id = $2")
            .bind(cart_id).bind(product_id).fetch_optional(&mut *self.tx).await?;
        row.map(|(id, q)| Ok(CartItem { id, cart_id, product_id, quantity: quantity(q)? })).transpose()
    }

    async fn insert_cart_item(&mut self, item: &CartItem) -> StoreResult<()> {
        sqlx::query("INSERT INTO carrinho_itens (id, carrinho_id, produto_id, quantidade) VALUES ($1, $2, $3, $4)")
            .bind(item.id).bind(item.cart_id).bind(item.product_id).bind(quantity_param(item.quantity))
            .execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(())
    }

    async fn set_cart_item_quantity(&mut self, cart_id: Uuid, product_id: Uuid, q: Quantity) -> StoreResult<u64> {
        let done = sqlx::query("UPDATE carrinho_itens SET quantidade = $3 WHERE carrinho_id = $1 AND produto_id = $2")
            .bind(cart_id).bind(product_id).bind(quantity_param(q))
            .execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(done.rows_affected())
    }

    async fn delete_cart_item(&mut self, cart_id: Uuid, product_id: Uuid) -> StoreResult<u64> {
        let done = sqlx::query("DELETE FROM carrinho_itens WHERE carrinho_id = $1 AND produto_id = $2")
            .bind(cart_id).bind(product_id).execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(done.rows_affected())
    }

    async fn clear_cart(&mut self, cart_id: Uuid) -> StoreResult<u64> {
        let done = sqlx::query("DELETE FROM carrinho_itens WHERE carrinho_id = $1")
            .bind(cart_id).execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(done.rows_affected())
    }

    async fn cart_lines(&mut self, cart_id: Uuid) -> StoreResult<Vec<CartLine>> {
        let rows = sqlx::query_as::<_, (Uuid, String, Decimal, i32)>(
            "SELECT p.id, p.nome, p.preco, ci.quantidade FROM carrinho_itens ci JOIN produto p ON ci.produto_id = p.id WHERE ci.carrinho_id = $1 ORDER BY ci.id",
        )
        .bind(cart_id).fetch_all(&mut *self.tx).await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.0).collect();
        let mut images = self.images_for(&ids).await?;
        rows.into_iter().map(|(product_id, name, unit_price, q)| {
            Ok(CartLine { product_id, name, unit_price, quantity: quantity(q)?, images: images.remove(&product_id).unwrap_or_default() })
        }).collect()
    }

    async fn insert_coupon(&mut self, c: &Coupon) -> StoreResult<()> {
        sqlx::query(&format!("INSERT INTO cupons ({COUPON_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"))
            .bind(c.id).bind(c.code.as_str()).bind(c.owner_id).bind(&c.month_year).bind(c.value).bind(c.kind.tag())
            .bind(c.used).bind(c.used_at).bind(c.created_at)
            .execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(())
    }

    async fn coupon_code_exists(&mut self, code: &CouponCode) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM cupons WHERE codigo = $1)")
            .bind(code.as_str()).fetch_one(&mut *self.tx).await?)
    }

    async fn find_coupon_by_code(&mut self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        sqlx::query_as::<_, CouponRow>(&format!("SELECT {COUPON_COLUMNS} FROM cupons WHERE codigo = $1"))
            .bind(code.as_str()).fetch_optional(&mut *self.tx).await?.map(Coupon::try_from).transpose()
    }

    async fn find_unused_coupon(&mut self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Coupon>> {
        sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM cupons WHERE id = $1 AND usuario_id = $2 AND utilizado = FALSE FOR UPDATE"
        ))
        .bind(id).bind(owner_id).fetch_optional(&mut *self.tx).await?.map(Coupon::try_from).transpose()
    }

    async fn coupon_issued_on(&mut self, owner_id: Uuid, kind_tag: &str, day: NaiveDate) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM cupons WHERE usuario_id = $1 AND tipo = $2 AND (criado_em AT TIME ZONE 'UTC')::DATE = $3)",
        )
        .bind(owner_id).bind(kind_tag).bind(day).fetch_one(&mut *self.tx).await?)
    }

    async fn mark_coupon_used(&mut self, id: Uuid, owner_id: Uuid, at: DateTime<Utc>) -> StoreResult<u64> {
        let done = sqlx::query("UPDATE cupons SET utilizado = TRUE, data_utilizacao = $3 WHERE id = $1 AND usuario_id = $2 AND utilizado = FALSE")
            .bind(id).bind(owner_id).bind(at).execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(done.rows_affected())
    }

    async fn release_coupon(&mut self, id: Uuid, owner_id: Uuid) -> StoreResult<u64> {
        let done = sqlx::query("UPDATE cupons SET utilizado = FALSE, data_utilizacao = NULL WHERE id = $1 AND usuario_id = $2 AND utilizado = TRUE")
            .bind(id).bind(owner_id).execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(done.rows_affected())
    }

    async fn birthday_run_recorded(&mut self, month: MonthYear) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM envio_aniversariantes WHERE mes_ano = $1)")
            .bind(month.to_string()).fetch_one(&mut *self.tx).await?)
    }

    async fn record_birthday_run(&mut self, month: MonthYear, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("INSERT INTO envio_aniversariantes (mes_ano, data_envio) VALUES ($1, $2)")
            .bind(month.to_string()).bind(at).execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(())
    }

    async fn insert_order(&mut self, o: &Order) -> StoreResult<()> {
        sqlx::query(&format!("INSERT INTO pedido ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"))
            .bind(o.id).bind(o.user_id).bind(o.status.as_str()).bind(o.date).bind(o.total).bind(o.position.as_str())
            .bind(o.coupon_id).bind(o.updated).bind(o.created_at)
            .execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(())
    }

    async fn insert_order_item(&mut self, order_id: Uuid, item: &OrderItem) -> StoreResult<()> {
        sqlx::query("INSERT INTO pedido_itens (pedido_id, produto_id, quantidade, preco_unitario) VALUES ($1, $2, $3, $4)")
            .bind(order_id).bind(item.product_id).bind(quantity_param(item.quantity)).bind(item.unit_price)
            .execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(())
    }

    async fn order_for_coupon(&mut self, coupon_id: Uuid) -> StoreResult<Option<Uuid>> {
        Ok(sqlx::query_scalar::<_, Uuid>("SELECT id FROM pedido WHERE cupom_id = $1 AND status <> 'Cancelado'")
            .bind(coupon_id).fetch_optional(&mut *self.tx).await?)
    }

    async fn find_order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM pedido WHERE id = $1 FOR UPDATE"))
            .bind(id).fetch_optional(&mut *self.tx).await?.map(Order::try_from).transpose()
    }

    async fn order_items(&mut self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
        let rows = sqlx::query_as::<_, (Uuid, i32, Decimal)>(
            "SELECT produto_id, quantidade, preco_unitario FROM pedido_itens WHERE pedido_id = $1 ORDER BY id",
        )
        .bind(order_id).fetch_all(&mut *self.tx).await?;
        rows.into_iter().map(|(product_id, q, unit_price)| Ok(OrderItem { product_id, quantity: quantity(q)?, unit_price })).collect()
    }

    async fn update_order_state(&mut self, id: Uuid, status: OrderStatus, position: Position) -> StoreResult<u64> {
        let done = sqlx::query("UPDATE pedido SET status = $2, posicao = $3, atualizado = TRUE WHERE id = $1")
            .bind(id).bind(status.as_str()).bind(position.as_str())
            .execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(done.rows_affected())
    }

    async fn list_orders(&mut self, user_id: Option<Uuid>) -> StoreResult<Vec<OrderSummary>> {
        #[derive(sqlx::FromRow)]
        struct Row { #[sqlx(flatten)] order: OrderRow, nome_usuario: String }

        let rows = sqlx::query_as::<_, Row>(
            "SELECT p.id, p.usuario_id, p.status, p.data, p.valor, p.posicao, p.cupom_id, p.atualizado, p.criado_em, u.nome AS nome_usuario \
             FROM pedido p JOIN usuario u ON p.usuario_id = u.id \
             WHERE $1::UUID IS NULL OR p.usuario_id = $1 \
             ORDER BY p.data DESC, p.id DESC",
        )
        .bind(user_id).fetch_all(&mut *self.tx).await?;
        rows.into_iter().map(|r| Ok(OrderSummary { order: Order::try_from(r.order)?, customer_name: r.nome_usuario })).collect()
    }

    async fn mark_order_seen(&mut self, id: Uuid, user_id: Uuid) -> StoreResult<u64> {
        let done = sqlx::query("UPDATE pedido SET atualizado = FALSE WHERE id = $1 AND usuario_id = $2")
            .bind(id).bind(user_id).execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(done.rows_affected())
    }

    async fn sales_total(&mut self, status: OrderStatus) -> StoreResult<Decimal> {
        Ok(sqlx::query_scalar::<_, Decimal>("SELECT COALESCE(SUM(valor), 0) FROM pedido WHERE status = $1")
            .bind(status.as_str()).fetch_one(&mut *self.tx).await?)
    }

    async fn monthly_sales(&mut self, status: OrderStatus, year: i32) -> StoreResult<Vec<(u32, Decimal)>> {
        let rows = sqlx::query_as::<_, (i32, Decimal)>(
            "SELECT EXTRACT(MONTH FROM data)::INT AS mes, COALESCE(SUM(valor), 0) AS vendas FROM pedido \
             WHERE status = $1 AND EXTRACT(YEAR FROM data)::INT = $2 GROUP BY mes ORDER BY mes",
        )
        .bind(status.as_str()).bind(year).fetch_all(&mut *self.tx).await?;
        rows.into_iter()
            .map(|(m, total)| u32::try_from(m).map(|m| (m, total)).map_err(|_| StoreError::Corrupt(format!("month {m}"))))
            .collect()
    }

    async fn insert_ticket(&mut self, t: &Ticket) -> StoreResult<()> {
        sqlx::query(&format!("INSERT INTO chamados ({TICKET_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"))
            .bind(t.id).bind(t.order_id).bind(&t.description).bind(&t.whatsapp).bind(&t.email).bind(t.opened_at)
            .execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(())
    }

    async fn list_tickets(&mut self) -> StoreResult<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!("SELECT {TICKET_COLUMNS} FROM chamados ORDER BY data_abertura DESC, id DESC"))
            .fetch_all(&mut *self.tx).await?;
        Ok(rows.into_iter().map(Ticket::from).collect())
    }

    async fn find_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(sqlx::query_as::<_, TicketRow>(&format!("SELECT {TICKET_COLUMNS} FROM chamados WHERE id = $1"))
            .bind(id).fetch_optional(&mut *self.tx).await?.map(Ticket::from))
    }

    async fn find_ticket_for_order(&mut self, order_id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM chamados WHERE pedido_id = $1 ORDER BY data_abertura DESC LIMIT 1"
        ))
        .bind(order_id).fetch_optional(&mut *self.tx).await?.map(Ticket::from))
    }

    async fn delete_ticket(&mut self, id: Uuid) -> StoreResult<u64> {
        let done = sqlx::query("DELETE FROM chamados WHERE id = $1").bind(id).execute(&mut *self.tx).await.map_err(map_err)?;
        Ok(done.rows_affected())
    }
}
