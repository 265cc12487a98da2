fn main() -> anyhow::Result<()> {
    jobmaster::jm::jmctl_cli::run()
}
