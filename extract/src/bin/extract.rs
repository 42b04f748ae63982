use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "extract",
    version,
    about = "Mirror a directory tree into an output directory, copying files concurrently",
    long_about = "`extract` walks the input directory and recreates it under the output directory,
copying every regular file with its permission bits. Copies start while the tree is still
being walked. Symlinks and special files are skipped.

EXAMPLE:
    # Mirror /data into /srv/out and print a summary
    extract -d /data -C /srv/out --summary"
)]
struct Args {
    /// Input directory
    #[arg(
        short = 'd',
        value_name = "DIR",
        default_value = "/data",
        help_heading = "Extraction"
    )]
    input: std::path::PathBuf,

    /// Output directory, empty means the current directory
    #[arg(
        short = 'C',
        value_name = "DIR",
        default_value = "",
        help_heading = "Extraction"
    )]
    output: String,

    #[command(flatten)]
    common: xtract::CommonArgs,
}

#[instrument]
async fn async_main(args: Args) -> anyhow::Result<common::Summary> {
    let settings = args.common.settings(common::Settings::tree_default());
    let dst = xtract::output_dir(&args.output);
    let (summary, cancelled) = xtract::with_cancellation(args.common.timeout, |cancel| {
        common::extract_tree(&args.input, &dst, &settings, cancel)
    })
    .await?;
    tracing::info!("wrote {} files to {:?}", summary.files_copied, &dst);
    args.common.finish(summary, cancelled)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let res = common::run(
        args.common.output_config(),
        args.common.runtime_config(),
        args.common.throttle_config(),
        func,
    );
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
