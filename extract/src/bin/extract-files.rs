use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "extract-files",
    version,
    about = "Copy a list of files into an output root, keeping their full paths",
    long_about = "`extract-files` copies each listed file to the same path joined under the output
root, e.g. `/etc/hosts` with `-C /srv/out` is copied to `/srv/out/etc/hosts`. All files are
copied concurrently. Every path must name a regular file.

EXAMPLE:
    # Copy two files, creating missing parent directories under /srv/out
    extract-files -C /srv/out --parents /etc/hosts /usr/share/dict/words"
)]
struct Args {
    /// Output root directory, empty means the current directory
    #[arg(
        short = 'C',
        value_name = "DIR",
        default_value = "/",
        help_heading = "Extraction"
    )]
    output: String,

    /// Create missing parent directories of each destination
    #[arg(short = 'p', long = "parents", help_heading = "Extraction")]
    parents: bool,

    #[command(flatten)]
    common: xtract::CommonArgs,

    // ARGUMENTS
    /// File(s) to copy
    #[arg()]
    paths: Vec<std::path::PathBuf>,
}

#[instrument]
async fn async_main(args: Args) -> anyhow::Result<common::Summary> {
    let settings = args.common.settings(common::Settings::flat_default());
    let dst = xtract::output_dir(&args.output);
    let paths = args.paths.clone();
    let (summary, cancelled) = xtract::with_cancellation(args.common.timeout, |cancel| {
        common::extract_files(paths, &dst, args.parents, &settings, cancel)
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
