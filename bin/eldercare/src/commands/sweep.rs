use super::load_context;

pub async fn run() -> anyhow::Result<()> {
    let ctx = load_context()?;
    let report = ctx.refill.sweep().await?;

    println!("Low-stock medications: {}", report.low_stock);
    println!("Already in progress:   {}", report.already_open);
    println!("New refill requests:   {}", report.created.len());
    if report.failed > 0 {
        println!("Failed (see log):      {}", report.failed);
    }
    for id in &report.created {
        println!("  {}", id);
    }
    Ok(())
}
