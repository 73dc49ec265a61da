use chrono::DateTime;
use serde::Serialize;

use crate::detector::alert::SwapAlert;

/// Finding record shipped to the alert transport (serialized as JSON).
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub name: String,
    pub description: String,
    pub alert_id: String,
    pub severity: String,
    pub finding_type: String,
    pub metadata: serde_json::Value,
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Label {
    pub entity: String,
    pub label: String,
    pub confidence: f64,
}

/// Build the outbound finding for a raised swap alert.
pub fn finding_from_alert(alert: &SwapAlert) -> Finding {
    let attacker = alert.attacker.to_string();

    let tokens: Vec<serde_json::Value> = alert
        .tokens_swapped
        .iter()
        .map(|m| {
            serde_json::json!({
                "token": m.token.to_string(),
                "amount": m.amount.to_string(),
                "tx_hash": m.tx_hash.to_string(),
            })
        })
        .collect();

    Finding {
        name: "Unusual Native Swaps".to_string(),
        description: format!("Unusual native swap behavior by {} has been detected", attacker),
        alert_id: "UNUSUAL-NATIVE-SWAPS".to_string(),
        severity: "unknown".to_string(),
        finding_type: "suspicious".to_string(),
        metadata: serde_json::json!({
            "attacker": attacker,
            "chain_id": alert.chain_id,
            "total_native_received": alert.total_native_received.to_string(),
            "swap_count": alert.swap_count,
            "first_block": alert.first_block,
            "first_timestamp": alert.first_timestamp,
            "last_block": alert.last_block,
            "last_timestamp": alert.last_timestamp,
            "last_seen": render_timestamp(alert.last_timestamp),
            "tokens_swapped": tokens,
            "anomaly_score": alert.anomaly_score,
        }),
        labels: vec![Label {
            entity: attacker,
            label: "Attacker".to_string(),
            confidence: 0.3,
        }],
    }
}

/// UTC rendering of a block timestamp for human readers of the finding.
fn render_timestamp(secs: u64) -> String {
    match DateTime::from_timestamp(secs as i64, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => secs.to_string(),
    }
}

/// Log the finding at warn level with its full JSON rendering.
pub fn emit(alert: &SwapAlert) {
    let finding = finding_from_alert(alert);
    match serde_json::to_string(&finding) {
        Ok(json) => tracing::warn!(
            alert_id = %finding.alert_id,
            attacker = %finding.labels[0].entity,
            anomaly_score = alert.anomaly_score,
            finding = %json,
            "ALERT RAISED"
        ),
        Err(e) => tracing::error!(error = %e, "Failed to serialize finding"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    use crate::detector::window::TokenMovement;

    #[test]
    fn test_finding_carries_all_alert_fields() {
        let alert = SwapAlert {
            chain_id: 1,
            attacker: Address::repeat_byte(0xaa),
            total_native_received: BigDecimal::from_str("35.5").unwrap(),
            swap_count: 3,
            first_block: 100,
            first_timestamp: 1000,
            last_block: 102,
            last_timestamp: 1024,
            tokens_swapped: vec![TokenMovement {
                token: Address::repeat_byte(1),
                amount: BigDecimal::from(100),
                tx_hash: B256::repeat_byte(2),
            }],
            anomaly_score: 0.25,
        };

        let finding = finding_from_alert(&alert);
        assert_eq!(finding.alert_id, "UNUSUAL-NATIVE-SWAPS");
        assert_eq!(finding.labels[0].label, "Attacker");

        let metadata = &finding.metadata;
        assert_eq!(metadata["total_native_received"], "35.5");
        assert_eq!(metadata["swap_count"], 3);
        assert_eq!(metadata["first_block"], 100);
        assert_eq!(metadata["last_block"], 102);
        assert_eq!(metadata["anomaly_score"], 0.25);
        assert_eq!(metadata["last_seen"], "1970-01-01 00:17:04 UTC");
        assert_eq!(metadata["tokens_swapped"].as_array().unwrap().len(), 1);

        // Round-trips through JSON without loss of the address rendering.
        let json = serde_json::to_string(&finding).unwrap();
        assert!(json.contains("UNUSUAL-NATIVE-SWAPS"));
    }
}
