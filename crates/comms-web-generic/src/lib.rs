use comms_core::{
    Dispatcher, GatewayResponse, Headers, HttpStatus, MediaKind, ProviderClient, ProviderError,
    ProviderReceipt, RawSendRequest, UploadSigner, ValidationError, Validator,
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Everything that can go wrong while handling a gateway request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("missing required query parameter: type")]
    MissingUploadType,
    #[error("{0}")]
    InvalidUploadType(String),
    #[error("media uploads are not configured")]
    UploadsDisabled,
}

/// Framework-agnostic processor that handles the core gateway logic
#[derive(Clone)]
pub struct GatewayProcessor {
    validator: Validator,
    dispatcher: Dispatcher,
    client: Arc<dyn ProviderClient>,
    signer: Option<Arc<dyn UploadSigner>>,
}

impl GatewayProcessor {
    pub fn new(
        validator: Validator,
        dispatcher: Dispatcher,
        client: Arc<dyn ProviderClient>,
    ) -> Self {
        Self {
            validator,
            dispatcher,
            client,
            signer: None,
        }
    }

    pub fn with_upload_signer(mut self, signer: Arc<dyn UploadSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn uploads_enabled(&self) -> bool {
        self.signer.is_some()
    }

    /// Handle a `POST /send` body and return a framework-agnostic response
    pub async fn process_send(&self, body: &[u8]) -> GatewayResponse {
        match self.process_send_internal(body).await {
            Ok(receipt) => GatewayResponse::sent(&receipt),
            Err(e) => self.error_to_response(e),
        }
    }

    async fn process_send_internal(&self, body: &[u8]) -> Result<ProviderReceipt, GatewayError> {
        let raw: RawSendRequest =
            serde_json::from_slice(body).map_err(|e| GatewayError::InvalidBody(e.to_string()))?;
        let request = self.validator.validate(&raw)?;
        let payload = self.dispatcher.dispatch(&request);

        info!(
            channel = %request.channel(),
            provider = self.client.provider(),
            "dispatching send request"
        );
        let receipt = self.client.deliver(&payload).await?;
        info!(
            channel = %request.channel(),
            id = %receipt.id,
            "provider accepted send request"
        );
        Ok(receipt)
    }

    /// Handle `GET /api/sign-upload?type=...`
    pub fn process_sign_upload(&self, upload_type: Option<&str>) -> GatewayResponse {
        match self.process_sign_upload_internal(upload_type) {
            Ok(upload) => match serde_json::to_value(&upload) {
                Ok(body) => GatewayResponse::json(HttpStatus::Ok, body),
                Err(e) => GatewayResponse::error(
                    HttpStatus::InternalServerError.as_u16(),
                    &format!("failed to encode upload signature: {}", e),
                ),
            },
            Err(e) => self.error_to_response(e),
        }
    }

    fn process_sign_upload_internal(
        &self,
        upload_type: Option<&str>,
    ) -> Result<comms_core::SignedUpload, GatewayError> {
        let kind = upload_type
            .filter(|t| !t.is_empty())
            .ok_or(GatewayError::MissingUploadType)?
            .parse::<MediaKind>()
            .map_err(GatewayError::InvalidUploadType)?;
        let signer = self.signer.as_ref().ok_or(GatewayError::UploadsDisabled)?;
        let upload = signer.sign(kind);
        info!(
            provider = signer.provider(),
            folder = %upload.folder,
            "issued signed upload"
        );
        Ok(upload)
    }

    fn error_to_response(&self, error: GatewayError) -> GatewayResponse {
        match error {
            GatewayError::InvalidBody(_)
            | GatewayError::Validation(_)
            | GatewayError::MissingUploadType
            | GatewayError::InvalidUploadType(_) => {
                debug!("rejected request: {}", error);
                GatewayResponse::error(HttpStatus::BadRequest.as_u16(), &error.to_string())
            }
            GatewayError::Provider(e) => {
                match &e {
                    ProviderError::Api {
                        status,
                        code,
                        message,
                        more_info,
                    } => error!(
                        provider = self.client.provider(),
                        status,
                        code = ?code,
                        more_info = ?more_info,
                        "provider rejected request: {}",
                        message
                    ),
                    other => error!(
                        provider = self.client.provider(),
                        "provider call failed: {}",
                        other
                    ),
                }
                GatewayResponse::error(e.status(), &e.client_message())
            }
            GatewayError::UploadsDisabled => {
                GatewayResponse::error(HttpStatus::ServiceUnavailable.as_u16(), &error.to_string())
            }
        }
    }
}

/// Helper trait for framework adapters to convert headers
pub trait HeaderConverter {
    type HeaderType;

    fn to_generic_headers(headers: &Self::HeaderType) -> Headers;
}

/// Helper trait for framework adapters to convert responses
pub trait ResponseConverter {
    type ResponseType;

    fn from_gateway_response(response: GatewayResponse) -> Self::ResponseType;
}
