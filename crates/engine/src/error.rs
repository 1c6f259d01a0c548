//! Engine error taxonomy.
//!
//! Fatal errors abort the job before or during setup; non-fatal errors
//! are scoped to a single row (or to finalization steps that degrade
//! gracefully) and never take the job down.

use crawjud_channel::ChannelError;
use crawjud_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Portal authentication failed before any row ran.
    #[error("Falha de autenticação: {0}")]
    Auth(String),

    /// The input bundle has no spreadsheet.
    #[error("Planilha de entrada ausente no pacote {0}")]
    MissingSpreadsheet(String),

    /// Spreadsheet decode/encode failure.
    #[error("erro de planilha: {0}")]
    Spreadsheet(String),

    /// The portal search found nothing for this row.
    #[error("Processo não encontrado!")]
    NotFound,

    /// A row failed inside the portal.
    #[error("{0}")]
    Row(String),

    /// Browser driver failure.
    #[error("falha no navegador: {0}")]
    Driver(String),

    /// Result archive creation failure.
    #[error("erro ao gerar arquivo zip: {0}")]
    Archive(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// True when the error must abort the whole job. Row-scoped errors
    /// and degraded finalization steps are non-fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Auth(_)
            | Self::MissingSpreadsheet(_)
            | Self::Spreadsheet(_)
            | Self::Storage(_)
            | Self::Channel(_)
            | Self::Io(_)
            | Self::Internal(_) => true,
            Self::NotFound | Self::Row(_) | Self::Driver(_) | Self::Archive(_) => false,
        }
    }
}
