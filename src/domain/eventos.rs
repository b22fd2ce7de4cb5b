use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use super::NotaFiscal;

/// Routing key of the event this service produces.
pub const EVENTO_IMPRESSAO_SOLICITADA: &str = "Faturamento.ImpressaoSolicitada";
/// Routing keys of the inventory-service replies this service consumes.
pub const ROUTING_ESTOQUE_RESERVADO: &str = "Estoque.Reservado";
pub const ROUTING_RESERVA_REJEITADA: &str = "Estoque.ReservaRejeitada";

/// A persisted business event, written in the same transaction as the
/// business rows it describes and forwarded to the broker by the background
/// publisher. Immutable except for the single null -> timestamp flip of
/// `data_publicacao`.
#[derive(Clone, Debug)]
pub struct EventoOutbox {
    pub id: i64,
    pub tipo_evento: String,
    pub id_agregado: Uuid,
    pub payload: serde_json::Value,
    pub data_ocorrencia: DateTime<Utc>,
    pub data_publicacao: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReserva {
    pub produto_id: Uuid,
    pub quantidade: i32,
}

/// Wire payload of `Faturamento.ImpressaoSolicitada`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpressaoSolicitada {
    pub nota_id: Uuid,
    pub itens: Vec<ItemReserva>,
}

impl ImpressaoSolicitada {
    pub fn da_nota(nota: &NotaFiscal) -> Self {
        Self {
            nota_id: nota.id,
            itens: nota
                .itens
                .iter()
                .map(|item| ItemReserva {
                    produto_id: item.produto_id,
                    quantidade: item.quantidade,
                })
                .collect(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadErro {
    #[error("payload invalido")]
    Json(#[from] serde_json::Error),
    #[error("notaId invalido: {0}")]
    NotaIdInvalido(#[source] uuid::Error),
}

// The inventory service has emitted two shapes of this reply over time: the
// current array form `{notaId, itens: [...]}` and a legacy flat form
// `{notaId, produtoId, quantidade}`. Both must keep parsing; the flat form is
// upconverted to a one-element array.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstoqueReservadoWire {
    nota_id: String,
    itens: Option<Vec<ItemReserva>>,
    produto_id: Option<Uuid>,
    quantidade: Option<i32>,
}

/// Parsed `Estoque.Reservado` reply.
#[derive(Clone, Debug)]
pub struct EstoqueReservado {
    pub nota_id: Uuid,
    /// May be an explicit empty list; the nota's own items decide the close.
    pub itens: Vec<ItemReserva>,
}

impl EstoqueReservado {
    /// Returns `Ok(None)` when the payload carries no item information in
    /// either form: such a reply is ignorable, and its `notaId` is never
    /// validated (the upconversion decides before the id is looked at).
    pub fn parse(body: &[u8]) -> Result<Option<Self>, PayloadErro> {
        let wire: EstoqueReservadoWire = serde_json::from_slice(body)?;
        let itens = match (wire.itens, wire.produto_id, wire.quantidade) {
            (Some(itens), _, _) => itens,
            (None, Some(produto_id), Some(quantidade)) => vec![ItemReserva {
                produto_id,
                quantidade,
            }],
            (None, _, _) => return Ok(None),
        };
        let nota_id = Uuid::parse_str(&wire.nota_id).map_err(PayloadErro::NotaIdInvalido)?;
        Ok(Some(Self { nota_id, itens }))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReservaRejeitadaWire {
    nota_id: String,
    #[serde(default)]
    motivo: String,
}

/// Parsed `Estoque.ReservaRejeitada` reply.
#[derive(Clone, Debug)]
pub struct ReservaRejeitada {
    pub nota_id: Uuid,
    pub motivo: String,
}

impl ReservaRejeitada {
    pub fn parse(body: &[u8]) -> Result<Self, PayloadErro> {
        let wire: ReservaRejeitadaWire = serde_json::from_slice(body)?;
        let nota_id = Uuid::parse_str(&wire.nota_id).map_err(PayloadErro::NotaIdInvalido)?;
        Ok(Self {
            nota_id,
            motivo: wire.motivo,
        })
    }
}
