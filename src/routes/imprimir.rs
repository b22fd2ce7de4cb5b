use std::fmt::Debug;

use actix_web::http::StatusCode;
use actix_web::web;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use anyhow::Context;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::error_chain_fmt;
use crate::domain::ImpressaoSolicitada;
use crate::domain::SolicitacaoImpressao;
use crate::domain::StatusNota;
use crate::domain::EVENTO_IMPRESSAO_SOLICITADA;
use crate::gateway;
use crate::gateway::solicitacoes::Insercao;
use crate::utils::resposta_erro;

#[derive(thiserror::Error)]
pub enum ImprimirErro {
    #[error("id invalido")]
    IdInvalido,
    #[error("Header Idempotency-Key obrigatorio")]
    ChaveAusente,
    #[error("Nota nao encontrada")]
    NotaNaoEncontrada,
    #[error("Nota nao esta aberta")]
    NotaNaoAberta,
    #[error("Nota sem itens nao pode ser impressa")]
    NotaSemItens,
    #[error(transparent)]
    Inesperado(#[from] anyhow::Error),
}

impl Debug for ImprimirErro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { error_chain_fmt(self, f) }
}

impl ResponseError for ImprimirErro {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::IdInvalido | Self::ChaveAusente => StatusCode::BAD_REQUEST,
            Self::NotaNaoEncontrada => StatusCode::NOT_FOUND,
            Self::NotaNaoAberta | Self::NotaSemItens => StatusCode::CONFLICT,
            Self::Inesperado(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        resposta_erro(self.status_code(), &self.to_string())
    }
}

/// `POST /api/v1/notas/:id/imprimir`, the Saga entry point.
///
/// The PENDENTE solicitação and its `Faturamento.ImpressaoSolicitada` outbox
/// row are written in one transaction: either both land or neither does. The
/// broker is deliberately not involved here; the background publisher picks
/// the event up after commit, so the handler never blocks on broker I/O.
#[tracing::instrument(name = "Admitindo solicitacao de impressao", skip_all)]
pub async fn imprimir_nota(
    path: web::Path<String>,
    request: HttpRequest,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, ImprimirErro> {
    let nota_id = Uuid::parse_str(&path).map_err(|_| ImprimirErro::IdInvalido)?;
    let chave = request
        .headers()
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ImprimirErro::ChaveAusente)?
        .to_string();

    // replay: same key means same operation, return the original request
    if let Some(existente) = gateway::solicitacoes::buscar_por_chave(&pool, &chave)
        .await
        .context("falha ao buscar solicitacao por chave")?
    {
        tracing::info!(chave_idempotencia = %chave, "replay de admissao");
        return Ok(HttpResponse::Ok().json(existente));
    }

    let nota = gateway::notas::buscar(&pool, nota_id, true)
        .await
        .context("falha ao buscar nota")?
        .ok_or(ImprimirErro::NotaNaoEncontrada)?;
    if nota.status != StatusNota::Aberta {
        return Err(ImprimirErro::NotaNaoAberta);
    }
    if nota.itens.is_empty() {
        return Err(ImprimirErro::NotaSemItens);
    }

    let chave_tx = chave.clone();
    gateway::with_transaction(&pool, move |tx| {
        Box::pin(async move {
            let solicitacao = SolicitacaoImpressao::nova(nota_id, chave_tx);
            // a concurrent request with the same key may have slipped in
            // between the lookup above and this insert; the unique constraint
            // settles the race and the loser commits a no-op
            if let Insercao::Criada =
                gateway::solicitacoes::inserir_pendente(tx, &solicitacao).await?
            {
                let payload = serde_json::to_value(ImpressaoSolicitada::da_nota(&nota))?;
                gateway::outbox::inserir(
                    tx,
                    EVENTO_IMPRESSAO_SOLICITADA,
                    nota_id,
                    &payload,
                    Utc::now(),
                )
                .await?;
            }
            Ok(())
        })
    })
    .await?;

    let criada = gateway::solicitacoes::buscar_por_chave(&pool, &chave)
        .await
        .context("falha ao reler solicitacao")?
        .context("solicitacao sumiu apos a admissao")?;
    Ok(HttpResponse::Created().json(criada))
}
