use std::error::Error;
use std::path::PathBuf;

use log::info;
use structopt::StructOpt;
use vision_serve::archive::ExtractStrategy;
use vision_serve::backend::backend_for;
use vision_serve::store::LocalStore;
use vision_serve::{HttpImageFetcher, ImageClassifier, ModelFormat, ModelLoader};

#[derive(StructOpt, Debug)]
#[structopt(
    name = "vision-classify",
    about = "Classify an image with a packaged model archive before deploying it"
)]
struct CmdArgs {
    #[structopt(help = "Path to the model archive (tar or tar.gz)")]
    archive: String,

    #[structopt(help = "URL to fetch image from")]
    image_url: String,

    #[structopt(
        long,
        default_value = "onnx",
        help = "Model format inside the archive: onnx or torchscript"
    )]
    format: ModelFormat,

    #[structopt(
        long,
        parse(from_os_str),
        help = "Unpack the archive into this directory instead of memory"
    )]
    extract_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let strategy = match args.extract_dir {
        Some(dir) => ExtractStrategy::Disk(dir),
        None => ExtractStrategy::InMemory,
    };

    let loader = ModelLoader::new(
        Box::new(LocalStore::default()),
        backend_for(args.format)?,
        &args.archive,
        strategy,
    );
    let classifier = ImageClassifier::new(loader, Box::new(HttpImageFetcher::new()));

    let prediction = classifier.classify_url(&args.image_url).await?;
    let json = serde_json::to_string(&prediction)?;

    info!("{}", json);
    println!("{}", json);

    Ok(())
}
