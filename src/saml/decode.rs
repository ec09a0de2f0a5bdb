use std::str;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::percent_decode_str;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{
    Assertion, Attribute, AttributeStatement, DecodedAssertion, RawAssertionPayload, SamlError,
    SamlErrorKind, SamlResponse,
};

/// Form field name preceding the encoded response in the captured body.
const FIELD_PREFIX: &str = "SAMLResponse=";

fn malformed(message: &str) -> SamlError {
    SamlError::new(SamlErrorKind::MalformedAssertion, message)
}

/// Turns a captured `SAMLResponse=...` request body into a typed response.
pub fn decode(payload: RawAssertionPayload) -> Result<DecodedAssertion, SamlError> {
    trace!("decode.start");
    let body = str::from_utf8(payload.as_bytes())
        .map_err(|_| malformed("the captured request body is not valid UTF-8"))?;

    let field = match body.strip_prefix(FIELD_PREFIX) {
        Some(rest) => rest.split('&').next().unwrap_or_default(),
        None => {
            return Err(malformed(
                "the captured request body does not start with a SAMLResponse field",
            ))
        }
    };

    trace!("decode.percent_decode");
    let encoded = percent_decode(field)?;

    trace!("decode.base64");
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let xml = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| malformed(&format!("the SAML response is not valid base64: {}", e)))?;
    let xml = String::from_utf8(xml)
        .map_err(|_| malformed("the decoded SAML response is not valid UTF-8"))?;

    trace!("decode.parse_response");
    let response = parse_response(&xml)?;

    trace!("decode.ok assertions={}", response.assertions.len());
    Ok(DecodedAssertion { encoded, response })
}

/// Strict percent-decoding: a `%` must always start a two digit hex escape.
fn percent_decode(field: &str) -> Result<String, SamlError> {
    let bytes = field.as_bytes();

    for (offset, byte) in bytes.iter().enumerate() {
        if *byte != b'%' {
            continue;
        }

        let escape_ok = bytes
            .get(offset + 1..offset + 3)
            .map(|hex| hex.iter().all(|c| c.is_ascii_hexdigit()))
            .unwrap_or(false);

        if !escape_ok {
            return Err(malformed(&format!(
                "invalid percent escape at offset {}",
                offset
            )));
        }
    }

    percent_decode_str(field)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| malformed("the percent-decoded SAML response is not valid UTF-8"))
}

/// Builds the response tree while reading, keeping only
/// `Response/Assertion/AttributeStatement/Attribute/AttributeValue`.
#[derive(Default)]
struct TreeBuilder {
    open: Vec<String>,
    root_seen: bool,
    response: SamlResponse,
    assertion: Option<Assertion>,
    statement: Option<AttributeStatement>,
    attribute: Option<Attribute>,
    value: Option<String>,
}

impl TreeBuilder {
    fn parent(&self) -> Option<String> {
        self.open.last().cloned()
    }

    fn start(&mut self, element: &BytesStart) -> Result<(), SamlError> {
        let name = local_name(element.local_name().as_ref())?;

        if self.open.is_empty() {
            if self.root_seen {
                return Err(malformed("the SAML document has more than one root element"));
            }
            if name != "Response" {
                return Err(malformed(&format!(
                    "expected a <Response> root element, found <{}>",
                    name
                )));
            }
            self.root_seen = true;
        }

        let parent = self.parent();
        match (name.as_str(), parent.as_deref()) {
            ("Assertion", Some("Response")) => self.assertion = Some(Assertion::default()),
            ("AttributeStatement", Some("Assertion")) if self.assertion.is_some() => {
                self.statement = Some(AttributeStatement::default())
            }
            ("Attribute", Some("AttributeStatement")) if self.statement.is_some() => {
                self.attribute = Some(read_attribute(element)?)
            }
            ("AttributeValue", Some("Attribute")) if self.attribute.is_some() => {
                self.value = Some(String::new())
            }
            _ => {}
        }

        self.open.push(name);
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(ref mut value) = self.value {
            value.push_str(text);
        }
    }

    fn end(&mut self) -> Result<(), SamlError> {
        let name = self
            .open
            .pop()
            .ok_or_else(|| malformed("unexpected closing tag outside of the root element"))?;

        let parent = self.parent();
        match (name.as_str(), parent.as_deref()) {
            ("AttributeValue", Some("Attribute")) => {
                if let (Some(value), Some(attribute)) = (self.value.take(), self.attribute.as_mut())
                {
                    attribute.values.push(value);
                }
            }
            ("Attribute", Some("AttributeStatement")) => {
                if let (Some(attribute), Some(statement)) =
                    (self.attribute.take(), self.statement.as_mut())
                {
                    statement.attributes.push(attribute);
                }
            }
            ("AttributeStatement", Some("Assertion")) => {
                if let (Some(statement), Some(assertion)) =
                    (self.statement.take(), self.assertion.as_mut())
                {
                    assertion.attribute_statements.push(statement);
                }
            }
            ("Assertion", Some("Response")) => {
                if let Some(assertion) = self.assertion.take() {
                    self.response.assertions.push(assertion);
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn finish(self) -> Result<SamlResponse, SamlError> {
        if let Some(name) = self.open.last() {
            return Err(malformed(&format!(
                "the SAML document ends inside <{}>",
                name
            )));
        }
        if !self.root_seen {
            return Err(malformed("the SAML document has no root element"));
        }
        if self.response.assertions.is_empty() {
            return Err(malformed("the SAML response carries no <Assertion> element"));
        }

        Ok(self.response)
    }
}

fn local_name(raw: &[u8]) -> Result<String, SamlError> {
    str::from_utf8(raw)
        .map(|s| s.to_owned())
        .map_err(|_| malformed("element name is not valid UTF-8"))
}

fn read_attribute(element: &BytesStart) -> Result<Attribute, SamlError> {
    let mut name = None;
    let mut friendly_name = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| malformed(&format!("invalid XML attribute: {}", e)))?;
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(&format!("invalid XML attribute value: {}", e)))?;

        match attr.key.local_name().as_ref() {
            b"Name" => name = Some(value.into_owned()),
            b"FriendlyName" => friendly_name = Some(value.into_owned()),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| malformed("<Attribute> element without a Name"))?;

    Ok(Attribute {
        name,
        friendly_name,
        values: vec![],
    })
}

fn parse_response(xml: &str) -> Result<SamlResponse, SamlError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut builder = TreeBuilder::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => builder.start(&e)?,
            Ok(Event::Empty(e)) => {
                builder.start(&e)?;
                builder.end()?;
            }
            Ok(Event::End(_)) => builder.end()?,
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| malformed(&format!("invalid XML text: {}", e)))?;
                builder.text(&text);
            }
            Ok(Event::CData(c)) => {
                let text = str::from_utf8(&c)
                    .map_err(|_| malformed("CDATA section is not valid UTF-8"))?;
                builder.text(text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(malformed(&format!(
                    "invalid XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    builder.finish()
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use url::form_urlencoded;

    pub(crate) fn response_xml(role_values: &[&str]) -> String {
        let values: String = role_values
            .iter()
            .map(|v| {
                format!(
                    r#"<saml:AttributeValue xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:type="xs:string">{}</saml:AttributeValue>"#,
                    v
                )
            })
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" Destination="https://signin.aws.amazon.com/saml" ID="ID_1" Version="2.0">
  <saml:Issuer>https://idp.example/realms/corp</saml:Issuer>
  <samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>
  <saml:Assertion ID="ID_2" Version="2.0">
    <saml:Issuer>https://idp.example/realms/corp</saml:Issuer>
    <saml:Subject><saml:NameID>jdoe</saml:NameID></saml:Subject>
    <saml:AttributeStatement>
      <saml:Attribute FriendlyName="RoleSessionName" Name="https://aws.amazon.com/SAML/Attributes/RoleSessionName" NameFormat="urn:oasis:names:tc:SAML:2.0:attrname-format:basic">
        <saml:AttributeValue>jdoe@example.com</saml:AttributeValue>
      </saml:Attribute>
      <saml:Attribute FriendlyName="Role" Name="https://aws.amazon.com/SAML/Attributes/Role" NameFormat="urn:oasis:names:tc:SAML:2.0:attrname-format:basic">
        {}
      </saml:Attribute>
    </saml:AttributeStatement>
  </saml:Assertion>
</samlp:Response>"#,
            values
        )
    }

    /// Encodes XML the way a browser submits the sign-in form.
    pub(crate) fn form_body(xml: &str) -> Vec<u8> {
        let encoded = STANDARD.encode(xml);
        form_urlencoded::Serializer::new(String::new())
            .append_pair("SAMLResponse", &encoded)
            .append_pair("RelayState", "")
            .finish()
            .into_bytes()
    }

    fn decode_xml(xml: &str) -> Result<DecodedAssertion, SamlError> {
        decode(RawAssertionPayload::new(form_body(xml)))
    }

    #[test]
    fn test_decode_builds_typed_tree() {
        let doc = decode_xml(&response_xml(&[
            "arn:aws:iam::111:role/Admin,arn:aws:iam::111:saml-provider/IDP",
        ]))
        .unwrap();

        let response = &doc.response;
        assert_eq!(response.assertions.len(), 1);
        assert_eq!(response.assertions[0].attribute_statements.len(), 1);

        let attributes: Vec<&Attribute> = response.attributes().collect();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[1].friendly_name.as_deref(), Some("Role"));
        assert_eq!(
            attributes[1].values,
            vec!["arn:aws:iam::111:role/Admin,arn:aws:iam::111:saml-provider/IDP"]
        );
        assert_eq!(doc.role_session_name(), Some("jdoe@example.com"));
    }

    #[test]
    fn test_decode_keeps_base64_body_for_exchange() {
        let xml = response_xml(&["arn:a,arn:b"]);
        let doc = decode_xml(&xml).unwrap();

        assert_eq!(doc.encoded(), STANDARD.encode(&xml));
    }

    #[test]
    fn test_decode_flattens_multiple_assertions_in_order() {
        let xml = r#"<Response>
            <Assertion>
              <AttributeStatement><Attribute Name="a"><AttributeValue>1</AttributeValue></Attribute></AttributeStatement>
              <AttributeStatement><Attribute Name="b"><AttributeValue>2</AttributeValue><AttributeValue/></Attribute></AttributeStatement>
            </Assertion>
            <Assertion>
              <AttributeStatement><Attribute Name="c"><AttributeValue><![CDATA[3]]></AttributeValue></Attribute></AttributeStatement>
            </Assertion>
          </Response>"#;
        let doc = decode_xml(xml).unwrap();

        let names: Vec<&str> = doc.response.attributes().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(doc.attribute("b").unwrap().values, vec!["2", ""]);
        assert_eq!(doc.attribute("c").unwrap().values, vec!["3"]);
    }

    #[test]
    fn test_decode_tolerates_wrapped_base64() {
        let xml = response_xml(&["arn:a,arn:b"]);
        let encoded = STANDARD.encode(&xml);
        let wrapped: Vec<String> = encoded
            .as_bytes()
            .chunks(76)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("SAMLResponse", &wrapped.join("\r\n"))
            .finish();

        assert!(decode(RawAssertionPayload::new(body.into_bytes())).is_ok());
    }

    #[test]
    fn test_decode_rejects_missing_prefix() {
        let err = decode(RawAssertionPayload::new(b"RelayState=&SAMLResponse=abc".to_vec()))
            .unwrap_err();

        assert_eq!(err.kind, SamlErrorKind::MalformedAssertion);
    }

    #[test]
    fn test_decode_rejects_bad_percent_escape() {
        let err =
            decode(RawAssertionPayload::new(b"SAMLResponse=PFJlc3%ZZ".to_vec())).unwrap_err();

        assert_eq!(err.kind, SamlErrorKind::MalformedAssertion);

        let err = decode(RawAssertionPayload::new(b"SAMLResponse=PFJlc3%2".to_vec())).unwrap_err();

        assert_eq!(err.kind, SamlErrorKind::MalformedAssertion);
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let err =
            decode(RawAssertionPayload::new(b"SAMLResponse=not*base64!".to_vec())).unwrap_err();

        assert_eq!(err.kind, SamlErrorKind::MalformedAssertion);
    }

    #[test]
    fn test_decode_rejects_invalid_xml() {
        for xml in &[
            "",
            "just text",
            "<Response><Assertion></Response>",
            "<Response><Assertion>",
            "<Response><Assertion></Assertion>",
            "<Response><Assertion/></Response><Response/>",
        ] {
            let err = decode_xml(xml).unwrap_err();
            assert_eq!(err.kind, SamlErrorKind::MalformedAssertion, "input: {:?}", xml);
        }
    }

    #[test]
    fn test_decode_requires_response_and_assertion() {
        let err = decode_xml("<Envelope><Assertion/></Envelope>").unwrap_err();
        assert_eq!(err.kind, SamlErrorKind::MalformedAssertion);

        let err = decode_xml("<samlp:Response xmlns:samlp=\"urn:x\"><Status/></samlp:Response>")
            .unwrap_err();
        assert_eq!(err.kind, SamlErrorKind::MalformedAssertion);
    }

    #[test]
    fn test_decode_requires_attribute_name() {
        let xml = "<Response><Assertion><AttributeStatement><Attribute><AttributeValue>x</AttributeValue></Attribute></AttributeStatement></Assertion></Response>";

        assert_eq!(
            decode_xml(xml).unwrap_err().kind,
            SamlErrorKind::MalformedAssertion
        );
    }
}
