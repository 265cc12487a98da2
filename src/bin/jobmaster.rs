fn main() -> anyhow::Result<()> {
    jobmaster::jm::cli::run()
}
