//! SOAP envelope construction and response parsing for UPnP control actions.
//!
//! The teacher's `pmoupnp::soap` builds *responses* (device-side, serving a
//! ContentDirectory) with `xmltree`; Korva only ever sends *requests*
//! (control-point side) and needs to read back the response, so this module
//! is the request-building mirror of `build_soap_response`, re-expressed
//! over `quick-xml`'s streaming reader instead of `xmltree` to keep one XML
//! stack across the workspace.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

/// Builds the SOAP envelope body for invoking `action` on `service_type`
/// with the given (name, value) arguments, in request-argument order.
pub fn build_action_request(service_type: &str, action: &str, args: &[(&str, &str)]) -> String {
    let mut body = String::new();
    body.push_str(&format!(
        "<u:{action} xmlns:u=\"{service_type}\">",
        action = action,
        service_type = service_type
    ));
    for (name, value) in args {
        body.push_str(&format!(
            "<{name}>{value}</{name}>",
            name = name,
            value = escape_text(value)
        ));
    }
    body.push_str(&format!("</u:{action}>", action = action));

    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\
         <s:Body>{body}</s:Body></s:Envelope>"
    )
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// A UPnP error extracted from a SOAP Fault (`detail/UPnPError`).
#[derive(Debug, Clone)]
pub struct UpnpFault {
    pub error_code: u32,
    pub error_description: String,
}

/// Outcome of parsing a SOAP response body: either the action's return
/// arguments, or a fault.
#[derive(Debug, Clone)]
pub enum SoapResponse {
    Action(HashMap<String, String>),
    Fault(UpnpFault),
}

/// Parses a SOAP response body, flattening the action response's direct
/// children into a `name -> text` map, or extracting a Fault's UPnPError.
pub fn parse_soap_response(xml: &[u8]) -> Result<SoapResponse, quick_xml::Error> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut depth_from_body: Option<u32> = None; // Some(0) once inside <s:Body>
    let mut in_fault = false;
    let mut in_upnp_error = false;
    let mut current_tag: Option<String> = None;
    let mut action_args = HashMap::new();
    let mut fault_code: Option<u32> = None;
    let mut fault_description: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = local_name(&e.name().as_ref().to_vec());
                if name.ends_with("Body") {
                    depth_from_body = Some(0);
                } else if let Some(depth) = depth_from_body {
                    if depth == 0 {
                        // First child of Body: either the action response or a Fault.
                        if name.eq_ignore_ascii_case("Fault") {
                            in_fault = true;
                        }
                        depth_from_body = Some(1);
                    } else if in_fault && name.eq_ignore_ascii_case("UPnPError") {
                        in_upnp_error = true;
                    } else {
                        current_tag = Some(name);
                    }
                }
            }
            Event::Text(e) => {
                let text = e.unescape()?.into_owned();
                if let Some(tag) = &current_tag {
                    if in_upnp_error {
                        if tag == "errorCode" {
                            fault_code = text.trim().parse().ok();
                        } else if tag == "errorDescription" {
                            fault_description = Some(text.trim().to_string());
                        }
                    } else if !in_fault {
                        action_args.insert(tag.clone(), text.trim().to_string());
                    }
                }
            }
            Event::End(e) => {
                let name = local_name(&e.name().as_ref().to_vec());
                if in_upnp_error && name.eq_ignore_ascii_case("UPnPError") {
                    in_upnp_error = false;
                }
                current_tag = None;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(code) = fault_code {
        return Ok(SoapResponse::Fault(UpnpFault {
            error_code: code,
            error_description: fault_description.unwrap_or_default(),
        }));
    }
    Ok(SoapResponse::Action(action_args))
}

fn local_name(qualified: &[u8]) -> String {
    let s = String::from_utf8_lossy(qualified);
    match s.rfind(':') {
        Some(idx) => s[idx + 1..].to_string(),
        None => s.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_request_with_args_in_order() {
        let xml = build_action_request(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "SetAVTransportURI",
            &[
                ("InstanceID", "0"),
                ("CurrentURI", "http://host/item/abc"),
                ("CurrentURIMetaData", ""),
            ],
        );
        assert!(xml.contains("<u:SetAVTransportURI xmlns:u=\"urn:schemas-upnp-org:service:AVTransport:1\">"));
        assert!(xml.contains("<InstanceID>0</InstanceID>"));
        assert!(xml.contains("<CurrentURI>http://host/item/abc</CurrentURI>"));
        assert!(xml.contains("</u:SetAVTransportURI>"));
    }

    #[test]
    fn escapes_ampersands_in_args() {
        let xml = build_action_request("urn:x", "Play", &[("Speed", "1&2")]);
        assert!(xml.contains("<Speed>1&amp;2</Speed>"));
    }

    #[test]
    fn parses_action_response_args() {
        let xml = br#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetTransportInfoResponse xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
      <CurrentTransportState>STOPPED</CurrentTransportState>
      <CurrentTransportStatus>OK</CurrentTransportStatus>
      <CurrentSpeed>1</CurrentSpeed>
    </u:GetTransportInfoResponse>
  </s:Body>
</s:Envelope>"#;
        match parse_soap_response(xml).unwrap() {
            SoapResponse::Action(args) => {
                assert_eq!(args.get("CurrentTransportState").unwrap(), "STOPPED");
                assert_eq!(args.get("CurrentSpeed").unwrap(), "1");
            }
            other => panic!("expected Action, got {:?}", other),
        }
    }

    #[test]
    fn parses_fault_with_upnp_error() {
        let xml = br#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <s:Fault>
      <faultcode>s:Client</faultcode>
      <faultstring>UPnPError</faultstring>
      <detail>
        <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
          <errorCode>705</errorCode>
          <errorDescription>Transport Locked</errorDescription>
        </UPnPError>
      </detail>
    </s:Fault>
  </s:Body>
</s:Envelope>"#;
        match parse_soap_response(xml).unwrap() {
            SoapResponse::Fault(fault) => {
                assert_eq!(fault.error_code, 705);
                assert_eq!(fault.error_description, "Transport Locked");
            }
            other => panic!("expected Fault, got {:?}", other),
        }
    }
}
