use async_trait::async_trait;
use clap::ArgMatches;
use color_eyre::eyre::Result;
use libjobwatch::config::{load_config, AggregatorConfig};
use thiserror::Error;

pub mod follow;
pub mod replay;

#[derive(Error, Debug)]
pub enum CommandErrors {
    #[error("Required user input `{0}` is missing.")]
    RequiredUserInputMissing(String),
    #[error("Argument `{0}` failed validation `{1}`")]
    InputValidationFailure(String, String),
    #[error("Invalid subcommand `{0}`.")]
    InvalidSubcommand(String),
    #[error("No subcommand provided.")]
    NoSubcommandProvided,
}

pub struct CliContext<'a> {
    pub client: reqwest::Client,
    pub matches: &'a ArgMatches,
}

impl<'a> CliContext<'a> {
    pub fn new(matches: &'a ArgMatches) -> Self {
        Self {
            client: reqwest::Client::new(),
            matches,
        }
    }
}

#[async_trait]
pub trait Command<'a> {
    fn new() -> Self
    where
        Self: Sized;

    async fn run(&self, context: &'a CliContext) -> Result<()>;
}

pub trait Arguments<'a> {
    /// Read argument from the CLI args with a validation function.
    fn read_argument_with_validator<V>(
        &self,
        arg_matches: &'a ArgMatches,
        id: &'a str,
        validator: &mut V,
    ) -> Result<String>
    where
        V: FnMut(&String) -> Result<(), CommandErrors>,
    {
        if let Some(arg) = arg_matches.get_one::<String>(id) {
            validator(arg)?;
            Ok(arg.clone())
        } else {
            Err(CommandErrors::RequiredUserInputMissing(id.into()))?
        }
    }

    /// Read an optional argument that must parse as a positive integer.
    fn read_positive_argument(&self, arg_matches: &'a ArgMatches, id: &'a str) -> Result<Option<u64>> {
        match arg_matches.get_one::<String>(id) {
            Some(arg) => match arg.parse::<u64>() {
                Ok(value) if value > 0 => Ok(Some(value)),
                _ => Err(CommandErrors::InputValidationFailure(
                    id.into(),
                    "positive integer".into(),
                ))?,
            },
            None => Ok(None),
        }
    }
}

/// Load the aggregator config named by `--config`, or the defaults.
pub async fn config_from_args(arg_matches: &ArgMatches) -> Result<AggregatorConfig> {
    match arg_matches.get_one::<String>("config") {
        Some(path) => load_config(path).await,
        None => Ok(AggregatorConfig::default()),
    }
}
