fn main() -> anyhow::Result<()> {
    freshlaa_admin_lib::run()?;
    Ok(())
}
