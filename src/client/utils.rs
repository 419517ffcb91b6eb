use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use crate::client::config::Config;

pub fn build_request(config: &Config) -> tokio_tungstenite::tungstenite::Result<Request> {
    format!("{}?key={}", config.base_url(), config.api_key().expose_secret()).into_client_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_puts_key_in_query() {
        let config = Config::builder()
            .with_base_url("wss://example.test/live")
            .with_api_key("secret")
            .build();
        let request = build_request(&config).unwrap();
        assert_eq!(request.uri().host(), Some("example.test"));
        assert_eq!(request.uri().path(), "/live");
        assert_eq!(request.uri().query(), Some("key=secret"));
    }
}
