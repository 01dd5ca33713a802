//! HTTP surface over the catalog and order ledger

use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, patch, post}, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::Validate;
use crate::domain::aggregates::{Order, PricingUpdate, Product, ProductSummary, Shop};
use crate::services::{Catalog, NewProduct, OrderLedger, PlaceOrder, StatusUpdate};
use crate::store::Store;
use crate::LedgerError;

pub struct AppState<S: Store> {
    pub catalog: Arc<Catalog<S>>,
    pub ledger: Arc<OrderLedger<S>>,
}

impl<S: Store> AppState<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { catalog: Arc::new(Catalog::new(store.clone())), ledger: Arc::new(OrderLedger::new(store)) }
    }
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self { Self { catalog: self.catalog.clone(), ledger: self.ledger.clone() } }
}

pub fn router<S: Store>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "shop-ledger"})) }))
        .route("/api/v1/shops", post(create_shop::<S>))
        .route("/api/v1/shops/:id/sales", get(monthly_sales::<S>))
        .route("/api/v1/products", post(create_product::<S>))
        .route("/api/v1/products/:id/price", get(current_price::<S>))
        .route("/api/v1/products/:id/summary", get(product_summary::<S>))
        .route("/api/v1/products/:id/pricing", patch(update_pricing::<S>))
        .route("/api/v1/orders", post(place_order::<S>))
        .route("/api/v1/orders/:id", get(get_order::<S>))
        .route("/api/v1/orders/:id/status", patch(update_order_status::<S>))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn reject(e: LedgerError) -> ApiError {
    let status = match &e {
        LedgerError::ShopNotFound | LedgerError::ProductNotFound | LedgerError::OrderNotFound => StatusCode::NOT_FOUND,
        LedgerError::InsufficientStock { .. } | LedgerError::InvalidTransition { .. }
        | LedgerError::ImmutableField(_) | LedgerError::ShopMismatch(_) => StatusCode::CONFLICT,
        LedgerError::InvalidInitialStatus(_) | LedgerError::InvalidQuantity
        | LedgerError::InvalidAmount(_) | LedgerError::InvalidPeriod { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::OrderNumberConflict | LedgerError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %e, "request failed");
    }
    (status, Json(serde_json::json!({"error": e.to_string(), "retryable": e.is_transient()})))
}

fn invalid(e: validator::ValidationErrors) -> ApiError {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(serde_json::json!({"error": e.to_string(), "retryable": false})))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateShopRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 3, max = 5))]
    pub currency: Option<String>,
}

async fn create_shop<S: Store>(State(s): State<AppState<S>>, Json(r): Json<CreateShopRequest>) -> Result<(StatusCode, Json<Shop>), ApiError> {
    r.validate().map_err(invalid)?;
    let shop = s.catalog.create_shop(&r.name, r.currency.as_deref().unwrap_or("EUR")).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(shop)))
}

async fn create_product<S: Store>(State(s): State<AppState<S>>, Json(r): Json<NewProduct>) -> Result<(StatusCode, Json<Product>), ApiError> {
    r.validate().map_err(invalid)?;
    let p = s.catalog.create_product(r).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(p)))
}

async fn update_pricing<S: Store>(State(s): State<AppState<S>>, Path(id): Path<String>, Json(r): Json<PricingUpdate>) -> Result<Json<Product>, ApiError> {
    s.catalog.update_pricing(&id, &r).await.map(Json).map_err(reject)
}

#[derive(Debug, Serialize)]
pub struct PriceResponse { pub product_id: String, pub current_price: Decimal }

async fn current_price<S: Store>(State(s): State<AppState<S>>, Path(id): Path<String>) -> Result<Json<PriceResponse>, ApiError> {
    let current_price = s.catalog.get_current_price(&id).await.map_err(reject)?;
    Ok(Json(PriceResponse { product_id: id, current_price }))
}

async fn product_summary<S: Store>(State(s): State<AppState<S>>, Path(id): Path<String>) -> Result<Json<ProductSummary>, ApiError> {
    s.catalog.product_summary(&id).await.map(Json).map_err(reject)
}

async fn place_order<S: Store>(State(s): State<AppState<S>>, Json(r): Json<PlaceOrder>) -> Result<(StatusCode, Json<Order>), ApiError> {
    r.validate().map_err(invalid)?;
    let o = s.ledger.place_order(r).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(o)))
}

async fn get_order<S: Store>(State(s): State<AppState<S>>, Path(id): Path<String>) -> Result<Json<Order>, ApiError> {
    s.ledger.get_order(&id).await.map(Json).map_err(reject)
}

async fn update_order_status<S: Store>(State(s): State<AppState<S>>, Path(id): Path<String>, Json(r): Json<StatusUpdate>) -> Result<Json<Order>, ApiError> {
    s.ledger.update_order_status(&id, r).await.map(Json).map_err(reject)
}

#[derive(Debug, Deserialize)] pub struct SalesParams { pub year: i32, pub month: u32 }
#[derive(Debug, Serialize)] pub struct SalesResponse { pub shop_id: String, pub year: i32, pub month: u32, pub total: Decimal }

async fn monthly_sales<S: Store>(State(s): State<AppState<S>>, Path(id): Path<String>, Query(p): Query<SalesParams>) -> Result<Json<SalesResponse>, ApiError> {
    let total = s.ledger.monthly_completed_sales(&id, p.year, p.month).await.map_err(reject)?;
    Ok(Json(SalesResponse { shop_id: id, year: p.year, month: p.month, total }))
}
