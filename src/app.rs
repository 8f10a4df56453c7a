use crate::completion::CompletionClient;
use crate::config::{AppConfig, HTTPConfig};
use crate::events::EventDispatcher;
use crate::http::create_app;
use crate::line::LineClient;
use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

type ServeFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

pub struct AppHandles {
    server: JoinHandle<()>,
}
impl AppHandles {
    pub async fn new(config: AppConfig) -> Result<AppHandles> {
        let platform = Arc::new(LineClient::new(&config.line)?);
        let completer = Arc::new(CompletionClient::new(&config.completion)?);
        let dispatcher = EventDispatcher::new(platform, completer);

        let app = create_app(&config.line.channel_secret, dispatcher);
        let server = Self::start_http_server(config.http, app).await?;

        Ok(AppHandles { server })
    }

    pub async fn run(self) {
        match self.server.await {
            Ok(_) => error!("HTTP Server task completed!"),
            Err(e) => error!("HTTP Server task failed: {e:?}!"),
        }
    }

    async fn start_http_server(config: HTTPConfig, app: axum::Router) -> Result<JoinHandle<()>> {
        let address = config.address;

        // Certificates are loaded up front so a bad TLS setup stops startup.
        let serve: ServeFuture = match config.tls {
            Some(_tls_config) => {
                #[cfg(feature = "tls-rustls")]
                {
                    let _ = rustls::crypto::CryptoProvider::install_default(
                        rustls::crypto::aws_lc_rs::default_provider(),
                    );
                    let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                        &_tls_config.certificate_path,
                        &_tls_config.key_path,
                    )
                    .await?;

                    info!("Starting HTTPS (secure) server on {address}");
                    Box::pin(async move {
                        axum_server::bind_rustls(address, tls)
                            .serve(app.into_make_service())
                            .await
                            .map_err(anyhow::Error::from)
                    })
                }

                #[cfg(all(feature = "tls-native", not(feature = "tls-rustls")))]
                {
                    let tls = axum_server::tls_openssl::OpenSSLConfig::from_pem_file(
                        &_tls_config.certificate_path,
                        &_tls_config.key_path,
                    )?;

                    info!("Starting HTTPS (secure) server on {address}");
                    Box::pin(async move {
                        axum_server::bind_openssl(address, tls)
                            .serve(app.into_make_service())
                            .await
                            .map_err(anyhow::Error::from)
                    })
                }

                #[cfg(not(any(feature = "tls-rustls", feature = "tls-native")))]
                anyhow::bail!(
                    "HTTP Server TLS configuration provided but no TLS features enabled. Compile with a TLS backend feature!"
                );
            }
            None => {
                info!("Starting HTTP (insecure) server on {address}");
                Box::pin(async move {
                    axum_server::bind(address)
                        .serve(app.into_make_service())
                        .await
                        .map_err(anyhow::Error::from)
                })
            }
        };

        Ok(tokio::spawn(async move {
            if let Err(e) = serve.await {
                error!("Server error: {e:?}");
            }
        }))
    }
}
