use log::debug;
use reqwest::StatusCode;

#[cfg(feature = "server")]
use crate::settlement::SettlementError;

pub fn map_any_err_and_code(e: anyhow::Error) -> (StatusCode, String) {
    debug!("Error: {:#}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
}
pub fn map_any_err(e: anyhow::Error) -> String {
    debug!("Error: {:#}", e);
    format!("{:#}", e)
}
#[cfg(feature = "server")]
pub fn map_settlement_err(e: SettlementError) -> (StatusCode, String) {
    debug!("Error: {}", e);
    match e {
        SettlementError::Internal(e) => map_any_err_and_code(e),
        e => (e.status_code(), e.to_string()),
    }
}
