use clap::Args;

use super::Session;

#[derive(Args, Debug)]
pub struct InitArgs {}

pub async fn run(_args: InitArgs, session: &Session) -> anyhow::Result<()> {
    let gatehouse = session.gatehouse().await?;
    let path = gatehouse
        .store()
        .path()
        .map_or_else(|| "(in memory)".to_string(), |p| p.display().to_string());
    session.say(format!("Initialized gatehouse store at {path}"));
    Ok(())
}
