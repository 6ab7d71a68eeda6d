use crate::api::{parse_http_request, send_http_response, ApiRouter, HttpResponse};
use crate::command::Options;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

// HTTP server for the observability and admin API, tokio only
pub async fn start_server(
    options: Options,
    api_router: ApiRouter,
    shutdown_notify: Arc<Notify>,
) -> Result<(), anyhow::Error> {
    let addr = format!("0.0.0.0:{}", options.port());
    let listener = TcpListener::bind(&addr).await?;
    log::info!("API server listening on {}", addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let router = api_router.clone();
                let web_log = options.web_log();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, router, web_log).await {
                        log::error!("Error handling connection: {}", e);
                    }
                });
            }
            _ = shutdown_notify.notified() => {
                log::info!("API server received shutdown signal, stopping...");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_connection(
    mut stream: TcpStream,
    router: ApiRouter,
    web_log: bool,
) -> Result<(), anyhow::Error> {
    let mut buffer = [0; 4096];
    let n = stream.read(&mut buffer).await?;

    let response = match parse_http_request(&buffer[..n]) {
        Ok(request) => {
            if web_log {
                log::info!("{} {}", request.method, request.path);
            }
            router
                .route_request(&request)
                .await
                .unwrap_or_else(|e| HttpResponse::error(500, e.to_string()))
        }
        Err(e) => HttpResponse::error(400, e.to_string()),
    };

    send_http_response(&mut stream, &response).await
}
