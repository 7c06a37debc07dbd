use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthType, AuthUrl, ClientId, ClientSecret,
    TokenResponse, TokenUrl,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::{
    CachedToken, ErpError, ErpGateway, ErpOrder, ErpOrderItem, StockAdjustment,
    StockAdjustmentResult, StockMovement, TokenCache,
};
use crate::config::ErpSettings;

/// Tiny status code for "Enviada".
const SITUACAO_ENVIADA: i64 = 5;
/// Used when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 300;

/// Client for the Tiny ERP v3 REST API.
pub struct TinyErpClient {
    http: reqwest::Client,
    oauth: BasicClient,
    base_url: String,
    cache: Arc<dyn TokenCache>,
    margin: chrono::Duration,
    refresh: Mutex<()>,
}

impl TinyErpClient {
    pub fn new(settings: ErpSettings, cache: Arc<dyn TokenCache>) -> Result<Self, ErpError> {
        let token_url = TokenUrl::new(settings.token_url.clone())
            .map_err(|e| ErpError::Auth(format!("invalid token URL: {}", e)))?;
        // The client-credentials grant never visits the authorization endpoint.
        let auth_url = AuthUrl::new(settings.token_url.clone())
            .map_err(|e| ErpError::Auth(format!("invalid token URL: {}", e)))?;

        let oauth = BasicClient::new(
            ClientId::new(settings.client_id.clone()),
            Some(ClientSecret::new(settings.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody);

        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ErpError::Transport(e.to_string()))?;

        let margin = chrono::Duration::from_std(settings.token_expiry_margin)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));

        Ok(Self {
            http,
            oauth,
            base_url: settings.base_url,
            cache,
            margin,
            refresh: Mutex::new(()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Returns a token that stays valid for at least the configured margin.
    async fn access_token(&self) -> Result<String, ErpError> {
        if let Some(token) = self.cached_fresh_token().await {
            return Ok(token);
        }

        // Concurrent callers wait for a single refresh.
        let _guard = self.refresh.lock().await;
        if let Some(token) = self.cached_fresh_token().await {
            return Ok(token);
        }

        debug!("requesting ERP access token");
        counter!("warehouse_erp.token_refresh", 1);
        let response = self
            .oauth
            .exchange_client_credentials()
            .request_async(async_http_client)
            .await
            .map_err(|e| ErpError::Auth(e.to_string()))?;

        let lifetime = response
            .expires_in()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));
        let token = CachedToken::new(response.access_token().secret(), Utc::now() + lifetime);
        self.cache.set(token.clone()).await;

        Ok(token.access_token)
    }

    async fn cached_fresh_token(&self) -> Option<String> {
        self.cache
            .get()
            .await
            .filter(|t| t.is_fresh(Utc::now(), self.margin))
            .map(|t| t.access_token)
    }

    /// Sends an authorized request. A 401 drops the cached token and retries once.
    async fn send<F>(&self, build: F) -> Result<Response, ErpError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let token = self.access_token().await?;
        let response = build(&self.http).bearer_auth(token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!("ERP rejected cached token; re-authenticating");
        self.cache.clear().await;
        let token = self.access_token().await?;
        let response = build(&self.http).bearer_auth(token).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ErpError::Auth("token rejected after refresh".into()));
        }
        Ok(response)
    }

    async fn find_product_id(&self, sku: &str) -> Result<String, ErpError> {
        let url = self.url("produtos");
        let response = self
            .send(|http| http.get(&url).query(&[("codigo", sku)]))
            .await?;
        let page: ListPage<TinyProductSummary> = ensure_success(response).await?.json().await?;

        page.itens
            .into_iter()
            .find(|p| p.sku.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(sku)))
            .map(|p| p.id.to_string())
            .ok_or_else(|| ErpError::NotFound(format!("product with SKU {}", sku)))
    }
}

#[async_trait::async_trait]
impl ErpGateway for TinyErpClient {
    #[instrument(skip(self))]
    async fn find_order_by_number(&self, number: &str) -> Result<ErpOrder, ErpError> {
        counter!("warehouse_erp.requests", 1, "operation" => "find_order");
        let url = self.url("pedidos");
        let response = self
            .send(|http| http.get(&url).query(&[("numero", number)]))
            .await?;
        let page: ListPage<TinyOrderSummary> = ensure_success(response).await?.json().await?;

        let summary = page
            .itens
            .into_iter()
            .find(|o| o.numero_pedido.to_string() == number)
            .ok_or_else(|| ErpError::NotFound(format!("order {}", number)))?;

        let detail_url = self.url(&format!("pedidos/{}", summary.id));
        let response = self.send(|http| http.get(&detail_url)).await?;
        let detail: TinyOrderDetail = ensure_success(response).await?.json().await?;

        Ok(ErpOrder {
            id: detail.id.to_string(),
            number: detail.numero_pedido.to_string(),
            status: detail.situacao.map(|code| situacao_label(code).to_string()),
            customer_name: detail.cliente.and_then(|c| c.nome),
            items: detail
                .itens
                .into_iter()
                .map(|item| ErpOrderItem {
                    sku: item.produto.sku,
                    description: item.produto.descricao.unwrap_or_default(),
                    quantity: item.quantidade,
                })
                .collect(),
        })
    }

    #[instrument(skip(self))]
    async fn mark_order_shipped(&self, erp_order_id: &str) -> Result<(), ErpError> {
        counter!("warehouse_erp.requests", 1, "operation" => "mark_shipped");
        let url = self.url(&format!("pedidos/{}/situacao", erp_order_id));
        let body = json!({ "situacao": SITUACAO_ENVIADA });
        let response = self.send(|http| http.put(&url).json(&body)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ErpError::NotFound(format!("order id {}", erp_order_id)));
        }
        ensure_success(response).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(sku = %adjustment.sku))]
    async fn adjust_stock(
        &self,
        adjustment: &StockAdjustment,
    ) -> Result<StockAdjustmentResult, ErpError> {
        counter!("warehouse_erp.requests", 1, "operation" => "adjust_stock");
        let product_id = self.find_product_id(&adjustment.sku).await?;

        let url = self.url(&format!("estoque/{}", product_id));
        let body = json!({
            "tipo": match adjustment.movement {
                StockMovement::Entrada => "E",
                StockMovement::Saida => "S",
            },
            "quantidade": adjustment.quantity,
            "observacoes": adjustment.note.clone().unwrap_or_default(),
        });
        let response = self.send(|http| http.post(&url).json(&body)).await?;
        let entry: TinyStockEntry = ensure_success(response)
            .await?
            .json()
            .await
            .unwrap_or_default();

        Ok(StockAdjustmentResult {
            product_id,
            sku: adjustment.sku.clone(),
            movement: adjustment.movement,
            quantity: adjustment.quantity,
            entry_id: entry.id_lancamento.map(|id| id.to_string()),
        })
    }
}

async fn ensure_success(response: Response) -> Result<Response, ErpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "ERP call failed");
    Err(ErpError::Upstream {
        status: status.as_u16(),
        body,
    })
}

fn situacao_label(code: i64) -> &'static str {
    match code {
        0 => "Aberta",
        1 => "Faturada",
        2 => "Cancelada",
        3 => "Aprovada",
        4 => "Preparando envio",
        5 => "Enviada",
        6 => "Entregue",
        7 => "Pronto para envio",
        8 => "Dados incompletos",
        9 => "Não entregue",
        _ => "Desconhecida",
    }
}

/// Tiny returns ids and order numbers as numbers or strings depending on the endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TinyId {
    Int(i64),
    Str(String),
}

impl std::fmt::Display for TinyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TinyId::Int(v) => write!(f, "{}", v),
            TinyId::Str(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListPage<T> {
    #[serde(default = "Vec::new")]
    itens: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TinyOrderSummary {
    id: TinyId,
    numero_pedido: TinyId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TinyOrderDetail {
    id: TinyId,
    numero_pedido: TinyId,
    situacao: Option<i64>,
    cliente: Option<TinyContact>,
    #[serde(default)]
    itens: Vec<TinyOrderLine>,
}

#[derive(Debug, Deserialize)]
struct TinyContact {
    nome: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TinyOrderLine {
    produto: TinyProductSummary,
    #[serde(default)]
    quantidade: f64,
}

#[derive(Debug, Deserialize)]
struct TinyProductSummary {
    id: TinyId,
    sku: Option<String>,
    descricao: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TinyStockEntry {
    id_lancamento: Option<TinyId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_detail_accepts_numeric_and_string_ids() {
        let detail: TinyOrderDetail = serde_json::from_value(json!({
            "id": 991,
            "numeroPedido": "1234",
            "situacao": 3,
            "itens": [
                { "produto": { "id": "55", "sku": "CAN-01", "descricao": "Caneca" }, "quantidade": 2.0 }
            ]
        }))
        .unwrap();

        assert_eq!(detail.id.to_string(), "991");
        assert_eq!(detail.numero_pedido.to_string(), "1234");
        assert_eq!(detail.itens[0].produto.id.to_string(), "55");
    }

    #[test]
    fn shipped_code_maps_to_label() {
        assert_eq!(situacao_label(SITUACAO_ENVIADA), "Enviada");
        assert_eq!(situacao_label(42), "Desconhecida");
    }
}
