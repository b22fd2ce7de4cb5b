//! Outbox publisher: a single background task that drains persisted events
//! into the broker. Runs forever; every failure is logged and retried on the
//! next poll, never bubbled to the HTTP side.

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use lapin::options::BasicPublishOptions;
use lapin::options::ExchangeDeclareOptions;
use lapin::types::FieldTable;
use lapin::types::ShortString;
use lapin::BasicProperties;
use lapin::Channel;
use lapin::Connection;
use lapin::ConnectionProperties;
use lapin::ExchangeKind;
use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::configuration::Settings;
use crate::domain::EventoOutbox;
use crate::gateway;
use crate::startup::get_connection_pool;

/// Topic exchange this service publishes on.
pub const EXCHANGE_FATURAMENTO: &str = "faturamento-eventos";

const LOTE: i64 = 20;
const PAUSA_OCIOSA: Duration = Duration::from_secs(2);
const PAUSA_APOS_ERRO: Duration = Duration::from_secs(3);
const PRAZO_PUBLICACAO: Duration = Duration::from_secs(5);
const TENTATIVAS_CONEXAO: usize = 15;
const PAUSA_RECONEXAO: Duration = Duration::from_secs(3);

/// To be spawned once at process start, alongside the API server.
pub async fn init_publicador(cfg: Settings) -> Result<(), anyhow::Error> {
    let pool = get_connection_pool(&cfg.database)?;
    let (_conexao, canal) = conectar(cfg.broker.url.expose_secret()).await?;
    loop_publicacao(&pool, &canal).await
}

/// Connect to the broker (it usually takes a while to come up in the compose
/// network, hence the retries) and declare the outgoing exchange.
async fn conectar(url: &str) -> Result<(Connection, Channel), anyhow::Error> {
    let mut tentativa = 1;
    let conexao = loop {
        match Connection::connect(url, ConnectionProperties::default()).await {
            Ok(conexao) => break conexao,
            Err(e) if tentativa < TENTATIVAS_CONEXAO => {
                tracing::warn!(
                    error.cause_chain = ?e,
                    tentativa,
                    "falha ao conectar ao broker para publicacao, nova tentativa em 3s"
                );
                tentativa += 1;
                tokio::time::sleep(PAUSA_RECONEXAO).await;
            }
            Err(e) => {
                return Err(anyhow::Error::from(e)
                    .context("falha ao conectar ao broker apos todas as tentativas"))
            }
        }
    };

    let canal = conexao.create_channel().await?;
    canal
        .exchange_declare(
            EXCHANGE_FATURAMENTO,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    tracing::info!("conectado ao broker para publicacao de eventos");
    Ok((conexao, canal))
}

async fn loop_publicacao(pool: &PgPool, canal: &Channel) -> Result<(), anyhow::Error> {
    tracing::info!(lote = LOTE, "publicador outbox iniciado");
    loop {
        match gateway::outbox::listar_nao_publicados(pool, LOTE).await {
            Err(e) => {
                tracing::error!(error.cause_chain = ?e, "falha ao buscar eventos pendentes");
                tokio::time::sleep(PAUSA_APOS_ERRO).await;
            }
            Ok(eventos) if eventos.is_empty() => tokio::time::sleep(PAUSA_OCIOSA).await,
            Ok(eventos) => {
                for evento in &eventos {
                    // an unpublished row stays unpublished on failure and the
                    // next poll retries it, which is where at-least-once comes
                    // from; consumers dedup by message_id
                    if let Err(e) = publicar_evento(pool, canal, evento).await {
                        tracing::error!(
                            error.cause_chain = ?e,
                            evento_id = evento.id,
                            "falha ao publicar evento"
                        );
                    }
                }
            }
        }
    }
}

#[tracing::instrument(skip_all, fields(evento_id = evento.id, tipo_evento = %evento.tipo_evento))]
async fn publicar_evento(
    pool: &PgPool,
    canal: &Channel,
    evento: &EventoOutbox,
) -> Result<(), anyhow::Error> {
    let corpo = serde_json::to_vec(&evento.payload).context("falha ao serializar payload")?;
    tokio::time::timeout(PRAZO_PUBLICACAO, async {
        canal
            .basic_publish(
                EXCHANGE_FATURAMENTO,
                &evento.tipo_evento,
                BasicPublishOptions::default(),
                &corpo,
                propriedades(evento),
            )
            .await?
            .await
    })
    .await
    .context("prazo de publicacao esgotado")?
    .context("broker recusou a publicacao")?;

    // the crash window between publish and this update is why duplicates can
    // reach the broker; message_id lets the other side drop them
    if let Err(e) = gateway::outbox::marcar_publicado(pool, evento.id, Utc::now()).await {
        tracing::warn!(
            error.cause_chain = ?e,
            "evento publicado mas nao marcado; sera republicado no proximo ciclo"
        );
    } else {
        tracing::info!(id_agregado = %evento.id_agregado, "evento publicado");
    }
    Ok(())
}

fn propriedades(evento: &EventoOutbox) -> BasicProperties {
    BasicProperties::default()
        .with_message_id(ShortString::from(evento.id.to_string()))
        .with_content_type(ShortString::from("application/json"))
        .with_timestamp(evento.data_ocorrencia.timestamp().max(0) as u64)
        .with_delivery_mode(2) // persistent
}
