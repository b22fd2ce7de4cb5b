use std::fmt::Debug;

use actix_web::http::StatusCode;
use actix_web::web;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use super::error_chain_fmt;
use crate::gateway;
use crate::utils::resposta_erro;

#[derive(thiserror::Error)]
pub enum ConsultarSolicitacaoErro {
    #[error("id invalido")]
    IdInvalido,
    #[error("Solicitacao nao encontrada")]
    NaoEncontrada,
    #[error(transparent)]
    Inesperado(#[from] anyhow::Error),
}

impl Debug for ConsultarSolicitacaoErro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { error_chain_fmt(self, f) }
}

impl ResponseError for ConsultarSolicitacaoErro {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::IdInvalido => StatusCode::BAD_REQUEST,
            Self::NaoEncontrada => StatusCode::NOT_FOUND,
            Self::Inesperado(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        resposta_erro(self.status_code(), &self.to_string())
    }
}

/// `GET /api/v1/solicitacoes-impressao/:id`: clients poll here for the
/// terminal outcome of the Saga (CONCLUIDA, or FALHOU with `mensagemErro`).
#[tracing::instrument(name = "Consultando solicitacao de impressao", skip_all)]
pub async fn consultar_solicitacao(
    path: web::Path<String>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, ConsultarSolicitacaoErro> {
    let id = Uuid::parse_str(&path).map_err(|_| ConsultarSolicitacaoErro::IdInvalido)?;
    let solicitacao = gateway::solicitacoes::buscar(&pool, id)
        .await
        .context("falha ao buscar solicitacao")?
        .ok_or(ConsultarSolicitacaoErro::NaoEncontrada)?;
    Ok(HttpResponse::Ok().json(solicitacao))
}
