use actix_web::http::StatusCode;
use actix_web::HttpResponse;

/// Error body shared by every endpoint: `{"erro": "..."}`.
pub fn resposta_erro(status: StatusCode, mensagem: &str) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({ "erro": mensagem }))
}
