//! A small service built on the facade crate.
//!
//! ```text
//! cargo run -p pylon --example hello
//! curl localhost:8080/greet/ada
//! curl -X POST localhost:8080/api/echo -d '{"text":"hi"}'
//! ```

use http::StatusCode;
use pylon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
struct Echo {
    text: String,
}

pylon::core::marker_key! {
    struct StartedKey;
}

fn timing() -> BoxedMiddleware {
    std::sync::Arc::new(
        middleware_fn(|ex, next| {
            Box::pin(async move {
                ex.set_value(StartedKey, std::time::Instant::now());
                next.run(ex).await;
                if let Some(started) = ex.value::<std::time::Instant>(StartedKey) {
                    tracing::debug!(elapsed_us = started.elapsed().as_micros(), "route finished");
                }
            })
        })
        .named("timing"),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::new()
        .with_development()
        .with_dotenv()?
        .with_optional_file("pylon.toml")?
        .with_env_prefix("PYLON")
        .load()?;
    init_logging(&config.logging.to_log_config())?;

    let mut router = Router::new(RouterOptions::from_config(&config));
    router.use_components(components![timing()]);

    router.get(
        "/greet/{name}",
        components![handler_fn(|ex| {
            Box::pin(async move {
                let name = path_param(ex, "name").unwrap_or("stranger").to_owned();
                ex.respond_text(StatusCode::OK, format!("hello, {name}"));
            })
        })],
    );

    router
        .group(
            "/api",
            components![abort_if(
                |ex| ex.request().headers().contains_key("x-block"),
                HttpError::forbidden("blocked by header"),
            )],
        )
        .post(
            "/echo",
            components![handler_fn(|ex| {
                Box::pin(async move {
                    match ex.decode_body::<Echo>() {
                        Ok(echo) => {
                            ex.respond_encoded(StatusCode::OK, &echo);
                        }
                        Err(e) => {
                            ex.record_error(HttpError::bad_request(e.to_string()));
                        }
                    }
                })
            })],
        );

    Server::new(config.server.clone(), router.build()?).run().await?;
    Ok(())
}
