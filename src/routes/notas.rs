use std::fmt::Debug;

use actix_web::http::StatusCode;
use actix_web::web;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::error::ErrorKind;
use sqlx::PgPool;
use uuid::Uuid;

use super::error_chain_fmt;
use crate::domain::ItemNota;
use crate::domain::NotaFiscal;
use crate::domain::StatusNota;
use crate::gateway;
use crate::utils::resposta_erro;

#[derive(Deserialize)]
pub struct CriarNotaBody {
    numero: String,
}

#[derive(thiserror::Error)]
pub enum CriarNotaErro {
    #[error("numero obrigatorio")]
    NumeroVazio,
    #[error("numero de nota ja existe")]
    NumeroDuplicado,
    #[error(transparent)]
    Inesperado(#[from] anyhow::Error),
}

impl Debug for CriarNotaErro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { error_chain_fmt(self, f) }
}

impl ResponseError for CriarNotaErro {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NumeroVazio => StatusCode::BAD_REQUEST,
            Self::NumeroDuplicado => StatusCode::CONFLICT,
            Self::Inesperado(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        resposta_erro(self.status_code(), &self.to_string())
    }
}

/// `POST /api/v1/notas`
#[tracing::instrument(name = "Criando nota fiscal", skip(body, pool), fields(numero = %body.numero))]
pub async fn criar_nota(
    body: web::Json<CriarNotaBody>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, CriarNotaErro> {
    if body.numero.trim().is_empty() {
        return Err(CriarNotaErro::NumeroVazio);
    }
    let nota = NotaFiscal::nova(body.0.numero);
    match gateway::notas::inserir(&pool, &nota).await {
        Ok(()) => Ok(HttpResponse::Created().json(nota)),
        Err(e) if e_violacao_de_unicidade(&e) => Err(CriarNotaErro::NumeroDuplicado),
        Err(e) => Err(anyhow::Error::from(e)
            .context("falha ao inserir nota")
            .into()),
    }
}

fn e_violacao_de_unicidade(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| matches!(db.kind(), ErrorKind::UniqueViolation))
        .unwrap_or(false)
}

#[derive(Deserialize)]
pub struct ListarNotasQuery {
    status: Option<String>,
}

#[derive(thiserror::Error)]
pub enum ListarNotasErro {
    #[error("status invalido: {0}")]
    StatusInvalido(String),
    #[error(transparent)]
    Inesperado(#[from] anyhow::Error),
}

impl Debug for ListarNotasErro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { error_chain_fmt(self, f) }
}

impl ResponseError for ListarNotasErro {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::StatusInvalido(_) => StatusCode::BAD_REQUEST,
            Self::Inesperado(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        resposta_erro(self.status_code(), &self.to_string())
    }
}

/// `GET /api/v1/notas?status=`
#[tracing::instrument(name = "Listando notas fiscais", skip(query, pool))]
pub async fn listar_notas(
    query: web::Query<ListarNotasQuery>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, ListarNotasErro> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(StatusNota::parse(s).map_err(ListarNotasErro::StatusInvalido)?),
    };
    let notas = gateway::notas::listar(&pool, status)
        .await
        .context("falha ao listar notas")?;
    Ok(HttpResponse::Ok().json(notas))
}

#[derive(thiserror::Error)]
pub enum BuscarNotaErro {
    #[error("id invalido")]
    IdInvalido,
    #[error("Nota nao encontrada")]
    NaoEncontrada,
    #[error(transparent)]
    Inesperado(#[from] anyhow::Error),
}

impl Debug for BuscarNotaErro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { error_chain_fmt(self, f) }
}

impl ResponseError for BuscarNotaErro {
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

/// `GET /api/v1/notas/:id`
#[tracing::instrument(name = "Buscando nota fiscal", skip_all)]
pub async fn buscar_nota(
    path: web::Path<String>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, BuscarNotaErro> {
    let id = Uuid::parse_str(&path).map_err(|_| BuscarNotaErro::IdInvalido)?;
    let nota = gateway::notas::buscar(&pool, id, true)
        .await
        .context("falha ao buscar nota")?
        .ok_or(BuscarNotaErro::NaoEncontrada)?;
    Ok(HttpResponse::Ok().json(nota))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdicionarItemBody {
    produto_id: Uuid,
    quantidade: i32,
    preco_unitario: Decimal,
}

#[derive(thiserror::Error)]
pub enum AdicionarItemErro {
    #[error("id invalido")]
    IdInvalido,
    #[error("{0}")]
    Validacao(String),
    #[error("Nota nao encontrada")]
    NotaNaoEncontrada,
    #[error("Nota nao esta aberta")]
    NotaNaoAberta,
    #[error(transparent)]
    Inesperado(#[from] anyhow::Error),
}

impl Debug for AdicionarItemErro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { error_chain_fmt(self, f) }
}

impl ResponseError for AdicionarItemErro {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::IdInvalido | Self::Validacao(_) => StatusCode::BAD_REQUEST,
            Self::NotaNaoEncontrada => StatusCode::NOT_FOUND,
            Self::NotaNaoAberta => StatusCode::CONFLICT,
            Self::Inesperado(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        resposta_erro(self.status_code(), &self.to_string())
    }
}

/// `POST /api/v1/notas/:id/itens`. Items may only join a nota that is still
/// ABERTA; afterwards the nota is frozen waiting for the Saga outcome.
#[tracing::instrument(name = "Adicionando item a nota", skip(path, body, pool))]
pub async fn adicionar_item(
    path: web::Path<String>,
    body: web::Json<AdicionarItemBody>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AdicionarItemErro> {
    let nota_id = Uuid::parse_str(&path).map_err(|_| AdicionarItemErro::IdInvalido)?;
    if body.quantidade < 1 {
        return Err(AdicionarItemErro::Validacao(
            "quantidade deve ser maior ou igual a 1".to_string(),
        ));
    }
    if body.preco_unitario < Decimal::ZERO {
        return Err(AdicionarItemErro::Validacao(
            "precoUnitario nao pode ser negativo".to_string(),
        ));
    }

    let nota = gateway::notas::buscar(&pool, nota_id, false)
        .await
        .context("falha ao buscar nota")?
        .ok_or(AdicionarItemErro::NotaNaoEncontrada)?;
    if nota.status != StatusNota::Aberta {
        return Err(AdicionarItemErro::NotaNaoAberta);
    }

    let item = ItemNota::novo(nota_id, body.produto_id, body.quantidade, body.preco_unitario);
    gateway::notas::inserir_item(&pool, &item)
        .await
        .context("falha ao inserir item")?;
    Ok(HttpResponse::Created().json(item))
}
