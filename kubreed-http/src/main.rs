//! Entry point of the workload process.

fn main() -> anyhow::Result<()> {
    kubreed_http::cli::execute()
}
