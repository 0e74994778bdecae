use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pagepilot::{ActOptions, Session, SessionConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Suppress noisy chromiumoxide connection logs
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("chromiumoxide::conn=off".parse().unwrap())
        .add_directive("chromiumoxide::handler=off".parse().unwrap());

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let (Some(url), Some(action)) = (args.next(), args.next()) else {
        eprintln!("Usage: pagepilot <url> <action>");
        eprintln!("Example: pagepilot https://example.com \"click the more information link\"");
        std::process::exit(2);
    };

    let session = Session::new(SessionConfig::from_env()).await?;
    session.goto(&url).await?;

    let result = session.act(ActOptions::new(action)).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    session.close().await?;
    Ok(())
}
