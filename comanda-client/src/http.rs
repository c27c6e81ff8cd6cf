//! HTTP client for network-based API calls

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use shared::menu::{MenuItem, MenuItemCreate};
use shared::order::{CreateOrderRequest, ItemStatus, Order, OrderStatus};

use crate::{ClientConfig, ClientError, ClientResult};

/// Error envelope returned by the server on non-2xx responses
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    code: String,
    message: String,
}

/// HTTP client for making network requests to a Comanda server
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpClient {
    /// Create a new HTTP client from configuration
    pub fn new(config: &ClientConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
        }
    }

    /// Set the table token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the current token
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Build authorization header value
    fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let mut request = self.client.get(self.url(path));

        if let Some(auth) = self.auth_header() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let mut request = self.client.post(self.url(path)).json(body);

        if let Some(auth) = self.auth_header() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Make a PUT request with JSON body
    pub async fn put<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let mut request = self.client.put(self.url(path)).json(body);

        if let Some(auth) = self.auth_header() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Make a DELETE request
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let mut request = self.client.delete(self.url(path));

        if let Some(auth) = self.auth_header() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Handle the HTTP response
    ///
    /// Success bodies are plain JSON; error bodies carry the server's
    /// `{code, message}` envelope.
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await?;
            return Err(match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) => ClientError::Api {
                    code: envelope.code,
                    message: envelope.message,
                },
                Err(_) => ClientError::Api {
                    code: status.as_u16().to_string(),
                    message: text,
                },
            });
        }

        response.json().await.map_err(Into::into)
    }

    // ========== Orders API ==========

    /// Fetch all orders, first-come-first-served
    pub async fn fetch_orders(&self) -> ClientResult<Vec<Order>> {
        self.get("/api/orders").await
    }

    /// Fetch active (unpaid) orders
    pub async fn fetch_active_orders(&self) -> ClientResult<Vec<Order>> {
        self.get("/api/orders/active").await
    }

    /// Fetch one order by id
    pub async fn fetch_order(&self, order_id: &str) -> ClientResult<Order> {
        self.get(&format!("/api/orders/{}", order_id)).await
    }

    /// Create an order (requires the table token and a live session)
    pub async fn create_order(&self, request: &CreateOrderRequest) -> ClientResult<Order> {
        self.post("/api/orders", request).await
    }

    /// Advance the whole order one stage
    pub async fn advance_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> ClientResult<Order> {
        #[derive(serde::Serialize)]
        struct UpdateStatusRequest {
            status: OrderStatus,
            force: bool,
        }

        self.put(
            &format!("/api/orders/{}/status", order_id),
            &UpdateStatusRequest {
                status,
                force: false,
            },
        )
        .await
    }

    /// Close an order (all items must be served)
    pub async fn close_order(&self, order_id: &str) -> ClientResult<Order> {
        self.advance_order_status(order_id, OrderStatus::Paid).await
    }

    /// Close an order from any state (admin override)
    pub async fn close_order_override(&self, order_id: &str) -> ClientResult<Order> {
        #[derive(serde::Serialize)]
        struct UpdateStatusRequest {
            status: OrderStatus,
            force: bool,
        }

        self.put(
            &format!("/api/orders/{}/status", order_id),
            &UpdateStatusRequest {
                status: OrderStatus::Paid,
                force: true,
            },
        )
        .await
    }

    /// Advance a single item one stage along its track
    pub async fn advance_item_status(
        &self,
        order_id: &str,
        item_id: &str,
        status: ItemStatus,
    ) -> ClientResult<Order> {
        #[derive(serde::Serialize)]
        struct UpdateItemStatusRequest {
            status: ItemStatus,
        }

        self.put(
            &format!("/api/orders/{}/items/{}/status", order_id, item_id),
            &UpdateItemStatusRequest { status },
        )
        .await
    }

    // ========== Menu API ==========

    /// Fetch the full catalog
    pub async fn fetch_menu(&self) -> ClientResult<Vec<MenuItem>> {
        self.get("/api/menu").await
    }

    /// Create a catalog entry
    pub async fn create_menu_item(&self, item: &MenuItemCreate) -> ClientResult<MenuItem> {
        self.post("/api/menu", item).await
    }

    /// Delete a catalog entry; returns whether it existed
    pub async fn delete_menu_item(&self, item_id: &str) -> ClientResult<bool> {
        self.delete(&format!("/api/menu/{}", item_id)).await
    }
}
