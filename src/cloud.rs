// src/cloud.rs

use serde::{de::DeserializeOwned, Deserialize};

use crate::coding::{ParseEncoder, SkipKeys};
use crate::error::ParseError;
use crate::node::ParseEncodable;
use crate::transport::{RestCommand, Transport};

/// Internal helper struct to deserialize the `{"result": ...}` wrapper from Parse Cloud Function responses.
#[derive(Deserialize, Debug)]
struct CloudFunctionResponse<T> {
    result: T,
}

/// Provides methods for interacting with Parse Cloud Code functions.
///
/// An instance of `ParseCloud` is obtained by calling [`cloud()`](crate::Parse::cloud)
/// on a client, or built over any [`Transport`] with [`ParseCloud::new`].
#[derive(Debug)]
pub struct ParseCloud<'a, T: Transport + ?Sized> {
    transport: &'a T,
    encoder: ParseEncoder,
}

impl<'a, T: Transport + ?Sized> ParseCloud<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        ParseCloud {
            transport,
            encoder: ParseEncoder::default(),
        }
    }

    pub fn with_encoder(transport: &'a T, encoder: ParseEncoder) -> Self {
        ParseCloud { transport, encoder }
    }

    /// Runs a Parse Cloud Function and returns its result.
    ///
    /// `params` must encode to a JSON object. Pointers to saved objects are
    /// substituted as usual; unsaved objects are rejected. The internal
    /// `functionJobName` key is never sent.
    pub async fn run<P, R>(&self, function_name: &str, params: &P) -> Result<R, ParseError>
    where
        P: ParseEncodable + ?Sized,
        R: DeserializeOwned,
    {
        if function_name.is_empty() {
            return Err(ParseError::InvalidInput(
                "Cloud function name cannot be empty".to_string(),
            ));
        }
        let body = self.encoder.encode(params, SkipKeys::Cloud)?;
        let response = self
            .transport
            .execute(RestCommand::RunFunction {
                name: function_name.to_string(),
                body,
            })
            .await?;
        let wrapper: CloudFunctionResponse<R> = serde_json::from_slice(&response)?;
        Ok(wrapper.result)
    }
}
