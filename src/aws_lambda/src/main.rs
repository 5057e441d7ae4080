use lambda_runtime::{service_fn, Error, LambdaEvent};
use log::{debug, info};
use vision_serve::store::S3Store;
use vision_serve::{HttpImageFetcher, ImageClassifier, InvocationEvent, ModelLoader, Settings};

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let settings = Settings::from_env()?;
    info!("Model Bucket is {}", settings.model_bucket);
    info!("Model Prefix is {}", settings.model_key);

    let store = S3Store::from_env(&settings.model_bucket).await;
    let loader = ModelLoader::from_settings(&settings, Box::new(store))?;
    let classifier = ImageClassifier::new(loader, Box::new(HttpImageFetcher::new()));

    // Cold start: no invocation is served unless the model loaded.
    classifier.state().await?;
    debug!("Loaded model in memory");

    let classifier_ref = &classifier;

    debug!("Dispatching handler");
    lambda_runtime::run(service_fn(
        move |event: LambdaEvent<InvocationEvent>| async move {
            let response = classifier_ref.handle(event.payload).await?;
            debug!("Response: {}", serde_json::to_string(&response)?);

            Ok::<_, Error>(response)
        },
    ))
    .await?;

    Ok(())
}
