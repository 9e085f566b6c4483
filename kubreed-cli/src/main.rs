//! Entry point of the `kubreed` command.

fn main() -> anyhow::Result<()> {
    kubreed_cli::cli::execute()
}
