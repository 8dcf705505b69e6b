fn main() -> anyhow::Result<()> {
    waypost::cli::run_cli()
}
