//! Event consumer: receives the inventory service's Saga replies and advances
//! nota + solicitação state, one database transaction per delivery.
//!
//! Idempotence contract: the broker delivers at least once, so every effect
//! is guarded by the `mensagens_processadas` table, keyed by the broker's
//! `message_id`. The row is written inside the same transaction as the
//! effect, which makes "processed" and "applied" indistinguishable.

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::BasicAckOptions;
use lapin::options::BasicConsumeOptions;
use lapin::options::BasicNackOptions;
use lapin::options::BasicQosOptions;
use lapin::options::ExchangeDeclareOptions;
use lapin::options::QueueBindOptions;
use lapin::options::QueueDeclareOptions;
use lapin::types::FieldTable;
use lapin::Channel;
use lapin::Connection;
use lapin::ConnectionProperties;
use lapin::ExchangeKind;
use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::configuration::Settings;
use crate::domain::EstoqueReservado;
use crate::domain::PayloadErro;
use crate::domain::ReservaRejeitada;
use crate::domain::StatusNota;
use crate::domain::ROUTING_ESTOQUE_RESERVADO;
use crate::domain::ROUTING_RESERVA_REJEITADA;
use crate::gateway;
use crate::gateway::PgTransaction;
use crate::startup::get_connection_pool;

/// Topic exchange the inventory service replies on.
pub const EXCHANGE_ESTOQUE: &str = "estoque-eventos";
/// Durable queue owned by this service.
pub const FILA_FATURAMENTO: &str = "faturamento-eventos";

/// Written to a pending solicitação when a reserva arrives for a nota that
/// has no persisted items.
pub const MSG_NOTA_SEM_ITENS: &str = "Nota sem itens nao pode ser fechada";

const TENTATIVAS_CONEXAO: usize = 10;
const PAUSA_RECONEXAO: Duration = Duration::from_secs(3);

/// What a delivery amounted to, for logging and for tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Desfecho {
    /// State was advanced (nota fechada, or solicitações atualizadas).
    Processada,
    /// Logical no-op (unknown nota, terminal state, empty reserva); the
    /// dedup row is still written so redeliveries stay no-ops.
    Ignorada,
    /// The dedup table already knew this message id.
    Duplicada,
}

#[derive(Debug, thiserror::Error)]
pub enum ErroConsumo {
    /// Poison message: a fresh delivery (the dedup gate found no record)
    /// whose payload will never parse. Requeueing it would loop forever, so
    /// it is dropped with a nack(requeue=false).
    #[error("payload invalido")]
    Payload(#[from] PayloadErro),
    /// Transient failure (database down, lock timeout): the transaction
    /// rolled back and the delivery is requeued for another attempt.
    #[error(transparent)]
    Transacao(#[from] anyhow::Error),
}

/// To be spawned once at process start. Prefetch 1 plus manual ack keeps the
/// task serial per message; extra instances are safe because of the nota row
/// lock and the dedup primary key.
pub async fn init_consumidor(cfg: Settings) -> Result<(), anyhow::Error> {
    let pool = get_connection_pool(&cfg.database)?;
    let (_conexao, canal) = conectar(cfg.broker.url.expose_secret()).await?;

    let mut entregas = canal
        .basic_consume(
            FILA_FATURAMENTO,
            "servico-faturamento",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("falha ao registrar o consumidor")?;

    tracing::info!(fila = FILA_FATURAMENTO, "consumidor iniciado, aguardando mensagens");
    while let Some(entrega) = entregas.next().await {
        let entrega = entrega.context("falha ao receber entrega do broker")?;
        tratar_entrega(&pool, entrega).await;
    }
    Ok(())
}

async fn conectar(url: &str) -> Result<(Connection, Channel), anyhow::Error> {
    let mut tentativa = 1;
    let conexao = loop {
        match Connection::connect(url, ConnectionProperties::default()).await {
            Ok(conexao) => break conexao,
            Err(e) if tentativa < TENTATIVAS_CONEXAO => {
                tracing::warn!(
                    error.cause_chain = ?e,
                    tentativa,
                    "falha ao conectar ao broker para consumo, nova tentativa em 3s"
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
            EXCHANGE_ESTOQUE,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    canal
        .queue_declare(
            FILA_FATURAMENTO,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    for routing_key in [ROUTING_ESTOQUE_RESERVADO, ROUTING_RESERVA_REJEITADA] {
        canal
            .queue_bind(
                FILA_FATURAMENTO,
                EXCHANGE_ESTOQUE,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
    }
    canal.basic_qos(1, BasicQosOptions::default()).await?;
    Ok((conexao, canal))
}

#[tracing::instrument(
    skip_all,
    fields(routing_key = %entrega.routing_key, id_mensagem = tracing::field::Empty)
)]
async fn tratar_entrega(pool: &PgPool, entrega: Delivery) {
    let routing_key = entrega.routing_key.as_str().to_string();
    let id_mensagem = identificar_mensagem(
        entrega.properties.message_id().as_ref().map(|s| s.as_str()),
        entrega.delivery_tag,
        &routing_key,
    );
    tracing::Span::current().record("id_mensagem", tracing::field::display(&id_mensagem));

    match processar_mensagem(pool, &id_mensagem, &routing_key, &entrega.data).await {
        Ok(desfecho) => {
            match desfecho {
                Desfecho::Processada => tracing::info!("mensagem processada"),
                Desfecho::Ignorada => tracing::info!("mensagem registrada como ignorada"),
                Desfecho::Duplicada => tracing::info!("mensagem duplicada, nada a fazer"),
            }
            if let Err(e) = entrega.ack(BasicAckOptions::default()).await {
                tracing::error!(error.cause_chain = ?e, "falha ao confirmar entrega");
            }
        }
        Err(ErroConsumo::Payload(e)) => {
            tracing::error!(error.cause_chain = ?e, "payload invalido, descartando mensagem");
            if let Err(e) = entrega
                .nack(BasicNackOptions {
                    requeue: false,
                    ..Default::default()
                })
                .await
            {
                tracing::error!(error.cause_chain = ?e, "falha ao descartar entrega");
            }
        }
        Err(ErroConsumo::Transacao(e)) => {
            tracing::error!(error.cause_chain = ?e, "falha ao processar, reencaminhando");
            if let Err(e) = entrega
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await
            {
                tracing::error!(error.cause_chain = ?e, "falha ao reencaminhar entrega");
            }
        }
    }
}

/// The broker's `message_id` is the dedup anchor. The synthesized fallback is
/// per-delivery only (a redelivery gets a fresh tag), so it cannot dedup
/// across attempts; producers are expected to always set `message_id`.
fn identificar_mensagem(message_id: Option<&str>, delivery_tag: u64, routing_key: &str) -> String {
    match message_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("{delivery_tag}-{routing_key}"),
    }
}

/// Apply one delivery inside a single transaction: dedup check, dispatch by
/// routing key, record the message, commit. Public so tests can inject
/// deliveries without a broker.
///
/// The dedup gate runs before the payload is even parsed: a redelivery of a
/// recorded message id must stay a committed no-op even when its body would
/// no longer parse.
pub async fn processar_mensagem(
    pool: &PgPool,
    id_mensagem: &str,
    routing_key: &str,
    corpo: &[u8],
) -> Result<Desfecho, ErroConsumo> {
    let id_mensagem = id_mensagem.to_string();
    let routing_key = routing_key.to_string();
    let corpo = corpo.to_vec();
    gateway::with_transaction(pool, move |tx| {
        Box::pin(async move {
            if gateway::mensagens::ja_processada(tx, &id_mensagem).await? {
                return Ok(Desfecho::Duplicada);
            }
            let desfecho = match routing_key.as_str() {
                ROUTING_ESTOQUE_RESERVADO => match EstoqueReservado::parse(&corpo)? {
                    Some(evento) => tratar_estoque_reservado(tx, evento).await?,
                    None => {
                        tracing::warn!("reserva sem itens em nenhuma das formas; ignorando");
                        Desfecho::Ignorada
                    }
                },
                ROUTING_RESERVA_REJEITADA => {
                    let evento = ReservaRejeitada::parse(&corpo)?;
                    tratar_reserva_rejeitada(tx, evento).await?
                }
                outro => {
                    tracing::warn!(routing_key = outro, "routing key desconhecida");
                    Desfecho::Ignorada
                }
            };
            gateway::mensagens::registrar(tx, &id_mensagem, Utc::now()).await?;
            Ok(desfecho)
        })
    })
    .await
    // a parse failure rode out of the transaction as anyhow; pull it back
    // apart so the caller can drop poison instead of requeueing it
    .map_err(|e| match e.downcast::<PayloadErro>() {
        Ok(payload) => ErroConsumo::Payload(payload),
        Err(outro) => ErroConsumo::Transacao(outro),
    })
}

/// `Estoque.Reservado`: the nota can be closed. The row lock serializes this
/// against a concurrent re-emission of the same reply.
async fn tratar_estoque_reservado(
    tx: &mut PgTransaction,
    evento: EstoqueReservado,
) -> Result<Desfecho, anyhow::Error> {
    let Some(mut nota) = gateway::notas::buscar_para_atualizacao(tx, evento.nota_id).await? else {
        tracing::warn!(nota_id = %evento.nota_id, "nota nao encontrada; evento ignorado");
        return Ok(Desfecho::Ignorada);
    };
    if nota.status != StatusNota::Aberta {
        // the reply arrived after a terminal transition; the dedup row is
        // still written by the caller
        tracing::info!(nota_id = %nota.id, "nota ja saiu de ABERTA; ignorando reserva");
        return Ok(Desfecho::Ignorada);
    }
    if nota.itens.is_empty() {
        gateway::solicitacoes::falhar_pendentes(tx, nota.id, MSG_NOTA_SEM_ITENS).await?;
        tracing::warn!(nota_id = %nota.id, "nota sem itens; solicitacao marcada como FALHOU");
        return Ok(Desfecho::Ignorada);
    }

    let agora = Utc::now();
    nota.fechar(agora)?;
    gateway::notas::salvar(tx, &nota).await?;
    gateway::solicitacoes::concluir_pendentes(tx, nota.id, agora).await?;
    tracing::info!(nota_id = %nota.id, "nota fechada");
    Ok(Desfecho::Processada)
}

/// `Estoque.ReservaRejeitada`: only the solicitação fails; the nota stays
/// ABERTA so the client can amend it and try again.
async fn tratar_reserva_rejeitada(
    tx: &mut PgTransaction,
    evento: ReservaRejeitada,
) -> Result<Desfecho, anyhow::Error> {
    let atualizadas =
        gateway::solicitacoes::falhar_pendentes(tx, evento.nota_id, &evento.motivo).await?;
    tracing::info!(
        nota_id = %evento.nota_id,
        motivo = %evento.motivo,
        atualizadas,
        "reserva rejeitada; solicitacoes pendentes marcadas como FALHOU"
    );
    Ok(Desfecho::Processada)
}
