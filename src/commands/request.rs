use anyhow::{Context, Result};
use auth_recovery::http::ApiRequest;
use auth_recovery::PersistenceOutcome;
use log::*;
use reqwest::Method;

use crate::app::App;
use crate::output::{print_success, print_warning};

/// Run one request through the recovery orchestrator and print the response body.
pub async fn run(
    app: &App,
    method: &str,
    url: &str,
    headers: &[String],
    body: Option<&str>,
) -> Result<()> {
    let request = build_request(method, url, headers, body)?;
    let orchestrator = app.orchestrator();

    let result = orchestrator.execute(request).await;
    app.save_ledger_or_warn().await;
    let recovered = result.with_context(|| format!("{} {} failed", method.to_uppercase(), url))?;

    info!(
        "{} {} -> {}",
        method.to_uppercase(),
        url,
        recovered.response.status
    );

    match &recovered.persistence {
        PersistenceOutcome::Saved if app.durable_store => {
            print_success(&format!("Credential saved for {}", recovered.endpoint))
        }
        PersistenceOutcome::Saved => print_warning(&format!(
            "Credential for {} kept for this run only: no CREDENTIAL_KEY configured",
            recovered.endpoint
        )),
        PersistenceOutcome::Failed(reason) => print_warning(&format!(
            "Request succeeded, but the credential for {} could not be saved: {}",
            recovered.endpoint, reason
        )),
        PersistenceOutcome::NotRequested => {}
    }

    println!("{}", recovered.response.body);
    Ok(())
}

/// Build an `ApiRequest` from command line pieces. Headers look like `Name: value`.
pub fn build_request(
    method: &str,
    url: &str,
    headers: &[String],
    body: Option<&str>,
) -> Result<ApiRequest> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method {method:?}"))?;
    let mut request = ApiRequest::new(method, url).with_context(|| format!("Invalid URL {url:?}"))?;

    for header in headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("Header {header:?} must look like `Name: value`"))?;
        request = request.with_header(name, value)?;
    }
    if let Some(body) = body {
        request = request.with_body(body);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use service::config::Config;

    #[test]
    fn test_build_request_parses_method_headers_and_body() {
        let request = build_request(
            "post",
            "https://mgmt.local/api/items",
            &["Accept: application/json".to_string(), "X-Trace:abc".to_string()],
            Some("{}"),
        )
        .unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.headers.get("accept").unwrap(), "application/json");
        assert_eq!(request.headers.get("x-trace").unwrap(), "abc");
        assert_eq!(request.body.as_deref(), Some("{}"));
    }

    #[test]
    fn test_header_without_colon_is_rejected() {
        let result = build_request("GET", "https://mgmt.local", &["Accept".to_string()], None);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_non_interactive_token_recovers_request() {
        let mut server = mockito::Server::new_async().await;
        let _rejected = server
            .mock("GET", "/status")
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(401)
            .with_header("www-authenticate", "Bearer")
            .create_async()
            .await;
        let accepted = server
            .mock("GET", "/status")
            .match_header("authorization", "Bearer ci-token")
            .with_status(200)
            .with_body("healthy")
            .create_async()
            .await;
        let url = format!("{}/status", server.url());

        let config = Config::try_parse_from([
            "restkit",
            "--non-interactive",
            "--auth-token",
            "ci-token",
            "request",
            "GET",
            url.as_str(),
        ])
        .unwrap();
        let app = App::from_config(config).await.unwrap();

        run(&app, "GET", &url, &[], None).await.unwrap();

        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_interactive_without_credential_is_cancelled() {
        let mut server = mockito::Server::new_async().await;
        let _rejected = server
            .mock("GET", "/status")
            .with_status(403)
            .create_async()
            .await;
        let url = format!("{}/status", server.url());

        let config =
            Config::try_parse_from(["restkit", "--non-interactive", "request", "GET", url.as_str()]).unwrap();
        let app = App::from_config(config).await.unwrap();

        let err = run(&app, "GET", &url, &[], None).await.unwrap_err();

        assert_eq!(crate::output::exit_code(&err), 130);
    }

    #[tokio::test]
    async fn test_ledger_write_failure_keeps_the_request_error() {
        let mut server = mockito::Server::new_async().await;
        let _rejected = server
            .mock("GET", "/status")
            .with_status(403)
            .create_async()
            .await;
        let url = format!("{}/status", server.url());
        let blocker = std::env::temp_dir().join(format!("restkit-ledger-blocker-{}", std::process::id()));
        std::fs::write(&blocker, "not a directory").unwrap();

        let config =
            Config::try_parse_from(["restkit", "--non-interactive", "request", "GET", url.as_str()]).unwrap();
        let mut app = App::from_config(config).await.unwrap();
        app.config.ledger_state = Some(blocker.join("ledger.json"));
        assert!(app.save_ledger().await.is_err());

        let err = run(&app, "GET", &url, &[], None).await.unwrap_err();

        assert_eq!(crate::output::exit_code(&err), 130);
        let _ = std::fs::remove_file(&blocker);
    }
}
