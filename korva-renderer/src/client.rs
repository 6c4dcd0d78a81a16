//! `AVTransport` and `ConnectionManager` control clients.
//!
//! Ported from `pmocontrol::soap_client::invoke_upnp_action` and
//! `pmocontrol::avtransport_client::AvTransportClient`: same
//! SOAPAction/Content-Type header shape and "don't treat 4xx/5xx as a
//! transport error, inspect the envelope instead" pattern, moved from
//! blocking `ureq` to async `reqwest` per the cooperative-loop,
//! non-blocking-I/O requirement (spec §5).

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use tracing::warn;

use crate::errors::RendererError;
use crate::soap::{build_action_request, parse_soap_response, SoapResponse};

const SOAP_CALL_TIMEOUT: Duration = Duration::from_secs(5);

async fn invoke(
    http: &Client,
    control_url: &str,
    service_type: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<HashMap<String, String>, RendererError> {
    let body = build_action_request(service_type, action, args);
    let soap_action = format!("\"{service_type}#{action}\"");

    let response = tokio::time::timeout(
        SOAP_CALL_TIMEOUT,
        http.post(control_url)
            .header("Content-Type", r#"text/xml; charset="utf-8""#)
            .header("SOAPAction", soap_action)
            .body(body)
            .send(),
    )
    .await
    .map_err(|_| RendererError::Timeout)??;

    let status = response.status();
    let raw_body = response.bytes().await?;

    match parse_soap_response(&raw_body) {
        Ok(SoapResponse::Action(args)) => {
            if status.is_success() {
                Ok(args)
            } else {
                Err(RendererError::ActionFailed(format!(
                    "{action} failed with HTTP status {status}"
                )))
            }
        }
        Ok(SoapResponse::Fault(fault)) => {
            if fault.error_code == 705 {
                Err(RendererError::TransportLocked)
            } else {
                Err(RendererError::ActionFailed(format!(
                    "{action} returned UPnP error {}: {}",
                    fault.error_code, fault.error_description
                )))
            }
        }
        Err(e) => {
            warn!("failed to parse SOAP response for {}: {}", action, e);
            Err(RendererError::Xml(e))
        }
    }
}

#[derive(Debug, Clone)]
pub struct AvTransportClient {
    http: Client,
    control_url: String,
    service_type: String,
}

impl AvTransportClient {
    pub fn new(http: Client, control_url: String, service_type: String) -> Self {
        Self {
            http,
            control_url,
            service_type,
        }
    }

    /// `701` (transition not available) is tolerated by the caller; this
    /// method surfaces it like any other action failure and lets the push
    /// protocol decide whether to ignore it.
    pub async fn stop(&self, instance_id: u32) -> Result<(), RendererError> {
        let id = instance_id.to_string();
        invoke(
            &self.http,
            &self.control_url,
            &self.service_type,
            "Stop",
            &[("InstanceID", &id)],
        )
        .await
        .map(|_| ())
    }

    pub async fn set_av_transport_uri(&self, uri: &str, meta: &str) -> Result<(), RendererError> {
        invoke(
            &self.http,
            &self.control_url,
            &self.service_type,
            "SetAVTransportURI",
            &[
                ("InstanceID", "0"),
                ("CurrentURI", uri),
                ("CurrentURIMetaData", meta),
            ],
        )
        .await
        .map(|_| ())
    }

    pub async fn play(&self, instance_id: u32, speed: &str) -> Result<(), RendererError> {
        let id = instance_id.to_string();
        invoke(
            &self.http,
            &self.control_url,
            &self.service_type,
            "Play",
            &[("InstanceID", &id), ("Speed", speed)],
        )
        .await
        .map(|_| ())
    }

    pub async fn get_transport_info(&self, instance_id: u32) -> Result<TransportInfo, RendererError> {
        let id = instance_id.to_string();
        let args = invoke(
            &self.http,
            &self.control_url,
            &self.service_type,
            "GetTransportInfo",
            &[("InstanceID", &id)],
        )
        .await?;

        Ok(TransportInfo {
            current_transport_state: args
                .get("CurrentTransportState")
                .cloned()
                .unwrap_or_default(),
            current_transport_status: args
                .get("CurrentTransportStatus")
                .cloned()
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TransportInfo {
    pub current_transport_state: String,
    pub current_transport_status: String,
}

#[derive(Debug, Clone)]
pub struct ConnectionManagerClient {
    http: Client,
    control_url: String,
    service_type: String,
}

impl ConnectionManagerClient {
    pub fn new(http: Client, control_url: String, service_type: String) -> Self {
        Self {
            http,
            control_url,
            service_type,
        }
    }

    /// `ConnectionManager::GetProtocolInfo` — returns the `Sink` list,
    /// comma-separated `ProtocolInfo` strings the renderer accepts.
    pub async fn get_protocol_info(&self) -> Result<Vec<String>, RendererError> {
        let args = invoke(
            &self.http,
            &self.control_url,
            &self.service_type,
            "GetProtocolInfo",
            &[],
        )
        .await?;

        let sink = args.get("Sink").cloned().unwrap_or_default();
        Ok(sink
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_info_defaults_to_empty_on_missing_fields() {
        let info = TransportInfo {
            current_transport_state: String::new(),
            current_transport_status: String::new(),
        };
        assert!(info.current_transport_state.is_empty());
    }
}
