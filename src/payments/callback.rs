//! Inbound gateway callback: a `<result>` XML document.

use crate::payments::reference::is_valid_reference;
use crate::payments::types::PaymentOutcome;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use thiserror::Error;

const ROOT_ELEMENT: &[u8] = b"result";
/// `statut` value reported for a completed payment
pub const STATUT_SUCCESS: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("callback body has no result element")]
    MissingPayload,

    #[error("malformed callback: {0}")]
    MalformedPayload(String),
}

/// Validated callback content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResult {
    pub statut: String,
    pub reference: String,
    pub customer_phone: Option<String>,
    pub token: Option<String>,
    pub amount: Option<i64>,
    pub fees: Option<i64>,
    pub message: Option<String>,
    /// Body exactly as received, persisted on the payment
    pub raw: String,
}

impl CallbackResult {
    pub fn outcome(&self) -> PaymentOutcome {
        if self.statut == STATUT_SUCCESS {
            PaymentOutcome::Success
        } else {
            PaymentOutcome::Failed
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawResult {
    statut: Option<String>,
    #[serde(rename = "ref")]
    reference: Option<String>,
    numero_client: Option<String>,
    token: Option<String>,
    amount: Option<String>,
    fees: Option<String>,
    message: Option<String>,
}

pub fn parse_callback(raw: &str) -> Result<CallbackResult, CallbackError> {
    if raw.trim().is_empty() || !has_result_root(raw)? {
        return Err(CallbackError::MissingPayload);
    }

    let parsed: RawResult = quick_xml::de::from_str(raw)
        .map_err(|e| CallbackError::MalformedPayload(e.to_string()))?;

    let statut = non_empty(parsed.statut)
        .ok_or_else(|| CallbackError::MalformedPayload("missing statut".to_string()))?;
    let reference = non_empty(parsed.reference)
        .ok_or_else(|| CallbackError::MalformedPayload("missing ref".to_string()))?;
    if !is_valid_reference(&reference) {
        return Err(CallbackError::MalformedPayload(format!(
            "invalid ref '{}'",
            reference
        )));
    }

    Ok(CallbackResult {
        statut,
        reference,
        customer_phone: non_empty(parsed.numero_client),
        token: non_empty(parsed.token),
        amount: parse_integer("amount", parsed.amount)?,
        fees: parse_integer("fees", parsed.fees)?,
        message: non_empty(parsed.message),
        raw: raw.to_string(),
    })
}

/// Whether the first element of the document is `<result>`
fn has_result_root(raw: &str) -> Result<bool, CallbackError> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => return Ok(e.name().as_ref() == ROOT_ELEMENT),
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == ROOT_ELEMENT {
                    return Err(CallbackError::MalformedPayload(
                        "empty result element".to_string(),
                    ));
                }
                return Ok(false);
            }
            Ok(Event::Eof) => return Ok(false),
            Ok(Event::Text(_)) => {
                return Err(CallbackError::MalformedPayload(
                    "text outside of an element".to_string(),
                ))
            }
            Ok(_) => continue,
            Err(e) => return Err(CallbackError::MalformedPayload(e.to_string())),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Integer amounts; `1500.0` is tolerated, `1500.5` is not
fn parse_integer(field: &str, value: Option<String>) -> Result<Option<i64>, CallbackError> {
    let Some(value) = non_empty(value) else {
        return Ok(None);
    };

    if let Ok(parsed) = value.parse::<i64>() {
        return Ok(Some(parsed));
    }

    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed.fract() == 0.0 => Ok(Some(parsed as i64)),
        _ => Err(CallbackError::MalformedPayload(format!(
            "{} is not an integer: '{}'",
            field, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUCCESS_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<result>
    <statut>1</statut>
    <ref>BPABCDEFGHIJK</ref>
    <numero_client>074123456</numero_client>
    <token>tok-123</token>
    <amount>15000</amount>
    <fees>150</fees>
    <message>Paiement effectue</message>
</result>"#;

    #[test]
    fn parses_success_callback() {
        let result = parse_callback(SUCCESS_BODY).unwrap();
        assert_eq!(result.statut, "1");
        assert_eq!(result.reference, "BPABCDEFGHIJK");
        assert_eq!(result.customer_phone.as_deref(), Some("074123456"));
        assert_eq!(result.token.as_deref(), Some("tok-123"));
        assert_eq!(result.amount, Some(15000));
        assert_eq!(result.fees, Some(150));
        assert_eq!(result.outcome(), PaymentOutcome::Success);
        assert_eq!(result.raw, SUCCESS_BODY);
    }

    #[test]
    fn any_other_statut_is_a_failure() {
        let body = "<result><statut>0</statut><ref>BP1</ref><message>Solde insuffisant</message></result>";
        let result = parse_callback(body).unwrap();
        assert_eq!(result.outcome(), PaymentOutcome::Failed);
        assert_eq!(result.message.as_deref(), Some("Solde insuffisant"));
        assert_eq!(result.token, None);
        assert_eq!(result.amount, None);
    }

    #[test]
    fn accepts_whole_decimal_amounts() {
        let body = "<result><statut>1</statut><ref>BP1</ref><amount>2500.0</amount></result>";
        assert_eq!(parse_callback(body).unwrap().amount, Some(2500));

        let body = "<result><statut>1</statut><ref>BP1</ref><fees>12.5</fees></result>";
        assert!(matches!(
            parse_callback(body),
            Err(CallbackError::MalformedPayload(_))
        ));
    }

    #[test]
    fn missing_result_element() {
        assert_eq!(parse_callback(""), Err(CallbackError::MissingPayload));
        assert_eq!(
            parse_callback("<response><statut>1</statut></response>"),
            Err(CallbackError::MissingPayload)
        );
    }

    #[test]
    fn missing_required_fields_are_malformed() {
        assert!(matches!(
            parse_callback("<result><ref>BP1</ref></result>"),
            Err(CallbackError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_callback("<result><statut>1</statut></result>"),
            Err(CallbackError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_callback("<result><statut>1</statut><ref>BP000000000000000</ref></result>"),
            Err(CallbackError::MalformedPayload(_))
        ));
    }

    #[test]
    fn broken_xml_is_malformed() {
        assert!(matches!(
            parse_callback("not xml at all"),
            Err(CallbackError::MalformedPayload(_))
        ));
        assert!(parse_callback("<result><statut>1</statut><ref>BP1</ref>").is_err());
    }
}
