use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("store error: {source}"))]
    Store { source: resource_store::Error },

    #[snafu(display("failed to generate cluster secrets: {message}"))]
    SecretsGeneration { message: String },

    #[snafu(display("config render error: {source}"))]
    ConfigRender { source: config_render::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<resource_store::Error> for Error {
    fn from(source: resource_store::Error) -> Self {
        Error::Store { source }
    }
}

impl From<config_render::Error> for Error {
    fn from(source: config_render::Error) -> Self {
        Error::ConfigRender { source }
    }
}
