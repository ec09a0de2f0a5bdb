use url::Url;

use crate::saml::RawAssertionPayload;

/// A request the login surface is about to send.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Send the request as usual.
    Continue,
    /// Drop the request and close the surface.
    Cancel,
}

/// Single-fire hook for the request that posts the assertion to the
/// sign-in endpoint.
///
/// The first matching request is captured and cancelled. Any later match is
/// cancelled as well but otherwise ignored, so a session never sees two
/// payloads.
#[derive(Debug)]
pub struct Interception {
    target: String,
    fired: bool,
    payload: Option<RawAssertionPayload>,
}

impl Interception {
    pub fn new(target: &str) -> Self {
        Interception {
            target: target.into(),
            fired: false,
            payload: None,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn matches(&self, url: &str) -> bool {
        match (Url::parse(&self.target), Url::parse(url)) {
            (Ok(target), Ok(url)) => {
                target.scheme() == url.scheme()
                    && target.host_str() == url.host_str()
                    && target.port_or_known_default() == url.port_or_known_default()
                    && target.path().trim_end_matches('/') == url.path().trim_end_matches('/')
            }
            _ => self.target == url,
        }
    }

    pub fn offer(&mut self, request: &OutboundRequest) -> Disposition {
        if !self.matches(&request.url) {
            trace!("interception.pass url={}", request.url);
            return Disposition::Continue;
        }

        if self.fired {
            debug!("ignoring a repeated request to {}", request.url);
            return Disposition::Cancel;
        }

        debug!("captured the assertion request to {}", request.url);
        self.fired = true;
        self.payload = Some(RawAssertionPayload::new(request.body.clone()));

        Disposition::Cancel
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Hands the captured payload over. Returns `None` if nothing was
    /// captured or it was already taken.
    pub fn take_payload(&mut self) -> Option<RawAssertionPayload> {
        self.payload.take()
    }
}
