use std::env;
use std::time::Duration;

use reqwest::blocking::{Client, ClientBuilder};
use reqwest::Proxy;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn get_proxied_client_builder() -> Result<ClientBuilder, reqwest::Error> {
    let mut cb = ClientBuilder::new();

    trace!("get_proxied_client_builder.http_proxy.before_check");
    if let Ok(http_proxy) = env::var("http_proxy") {
        trace!("get_proxied_client_builder.http_proxy={}", http_proxy);
        cb = cb.proxy(Proxy::http(&http_proxy)?);
    }

    trace!("get_proxied_client_builder.https_proxy.before_check");
    if let Ok(https_proxy) = env::var("https_proxy") {
        trace!("get_proxied_client_builder.https_proxy={}", https_proxy);
        cb = cb.proxy(Proxy::https(&https_proxy)?);
    }

    trace!("get_proxied_client_builder.done");
    Ok(cb)
}

pub fn build_client() -> Result<Client, reqwest::Error> {
    get_proxied_client_builder()?
        .timeout(REQUEST_TIMEOUT)
        .build()
}
