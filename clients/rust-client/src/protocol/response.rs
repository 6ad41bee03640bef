use bson::{doc, Bson, Document};

use super::error::ProtocolError;

/// The envelope sent back for every request, echoing its token.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Success { token: String, data: Option<Bson> },
    Failure { token: String, error: String },
}

impl Reply {
    /// Create a success reply, optionally carrying data
    pub fn ok(token: impl Into<String>, data: Option<Bson>) -> Self {
        Reply::Success {
            token: token.into(),
            data,
        }
    }

    /// Create a failure reply from anything printable
    pub fn error(token: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Reply::Failure {
            token: token.into(),
            error: error.to_string(),
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Reply::Success { token, .. } | Reply::Failure { token, .. } => token,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Success { .. })
    }

    pub fn to_document(&self) -> Document {
        match self {
            Reply::Success { token, data } => {
                let mut message = doc! { "success": true, "token": token.as_str() };
                if let Some(data) = data {
                    message.insert("data", data.clone());
                }
                message
            }
            Reply::Failure { token, error } => doc! {
                "success": false,
                "token": token.as_str(),
                "error": error.as_str(),
            },
        }
    }

    pub fn from_document(mut message: Document) -> Result<Self, ProtocolError> {
        let token = message
            .get_str("token")
            .map_err(|_| ProtocolError::MissingToken)?
            .to_string();
        let success = message.get_bool("success").unwrap_or(false);

        if success {
            Ok(Reply::Success {
                token,
                data: message.remove("data"),
            })
        } else {
            let error = match message.remove("error") {
                Some(Bson::String(error)) => error,
                Some(other) => other.to_string(),
                None => "unknown error".to_string(),
            };
            Ok(Reply::Failure { token, error })
        }
    }

    /// Success data (null when the reply carried none), or the error text.
    pub fn into_result(self) -> Result<Bson, String> {
        match self {
            Reply::Success { data, .. } => Ok(data.unwrap_or(Bson::Null)),
            Reply::Failure { error, .. } => Err(error),
        }
    }
}
