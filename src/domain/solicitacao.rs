use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Print-request lifecycle. PENDENTE is the only non-terminal state; the
/// consumer moves a request to CONCLUIDA or FALHOU exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusSolicitacao {
    #[serde(rename = "PENDENTE")]
    Pendente,
    #[serde(rename = "CONCLUIDA")]
    Concluida,
    #[serde(rename = "FALHOU")]
    Falhou,
}

impl StatusSolicitacao {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendente => "PENDENTE",
            Self::Concluida => "CONCLUIDA",
            Self::Falhou => "FALHOU",
        }
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "PENDENTE" => Ok(Self::Pendente),
            "CONCLUIDA" => Ok(Self::Concluida),
            "FALHOU" => Ok(Self::Falhou),
            outro => Err(format!("status de solicitacao desconhecido: {outro:?}")),
        }
    }

    pub fn terminal(&self) -> bool { !matches!(self, Self::Pendente) }
}

/// A client's idempotency-keyed intent to close-and-print a nota. From the
/// client's perspective this row is the long-running outcome of the whole
/// Saga: it is polled until the status turns terminal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolicitacaoImpressao {
    pub id: Uuid,
    pub nota_id: Uuid,
    pub status: StatusSolicitacao,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mensagem_erro: Option<String>,
    pub chave_idempotencia: String,
    pub data_criacao: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_conclusao: Option<DateTime<Utc>>,
}

impl SolicitacaoImpressao {
    pub fn nova(nota_id: Uuid, chave_idempotencia: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            nota_id,
            status: StatusSolicitacao::Pendente,
            mensagem_erro: None,
            chave_idempotencia,
            data_criacao: Utc::now(),
            data_conclusao: None,
        }
    }
}
