use prismdrive_protocol::constants::{
    FIELD_FILE, FIELD_PARENT_ID, FIELD_RELATIVE_PATH, UPLOADS_ENDPOINT,
};
use reqwest::Method;

use crate::progress::ProgressTap;
use crate::validation::{validate_file_name, validate_relative_path};
use crate::{TransferError, TransferRequest};

/// Fully validated description of the HTTP request for one upload.
///
/// Owns the progress tap (and through it the source handle) until the
/// executor takes it.
pub struct RequestDescriptor<'a> {
    pub(crate) method: Method,
    pub(crate) endpoint: &'static str,
    pub(crate) fields: Vec<(&'static str, String)>,
    pub(crate) file_field: &'static str,
    pub(crate) file_name: String,
    pub(crate) content_length: u64,
    pub(crate) tap: ProgressTap<'a>,
}

impl RequestDescriptor<'_> {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn endpoint(&self) -> &'static str {
        self.endpoint
    }

    /// Text fields, sent before the file part in this order.
    pub fn fields(&self) -> &[(&'static str, String)] {
        &self.fields
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Exact byte length of the file part.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }
}

impl std::fmt::Debug for RequestDescriptor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .field("fields", &self.fields)
            .field("file_name", &self.file_name)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// A request that failed validation. Gives the tap back so the caller
/// can still hand its handle to the reconciler.
pub struct Rejected<'a> {
    pub error: TransferError,
    pub tap: ProgressTap<'a>,
}

impl std::fmt::Debug for Rejected<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rejected").field("error", &self.error).finish()
    }
}

/// Turns a [`TransferRequest`] into a [`RequestDescriptor`].
///
/// Checks, before anything is sent:
/// - the declared length equals the source size
/// - the tap has not been read from
/// - the file name is a single path segment
/// - the relative path stays under the destination folder
pub struct TransferRequestBuilder {
    request: TransferRequest,
}

impl TransferRequestBuilder {
    pub fn new(request: TransferRequest) -> Self {
        Self { request }
    }

    pub fn build<'a>(self, tap: ProgressTap<'a>) -> Result<RequestDescriptor<'a>, Rejected<'a>> {
        match self.check(&tap) {
            Ok((file_name, fields)) => Ok(RequestDescriptor {
                method: Method::POST,
                endpoint: UPLOADS_ENDPOINT,
                fields,
                file_field: FIELD_FILE,
                file_name,
                content_length: self.request.byte_length(),
                tap,
            }),
            Err(error) => Err(Rejected { error, tap }),
        }
    }

    fn check(
        &self,
        tap: &ProgressTap<'_>,
    ) -> Result<(String, Vec<(&'static str, String)>), TransferError> {
        let declared = self.request.byte_length();
        if declared != tap.total() {
            return Err(TransferError::LengthMismatch {
                declared,
                actual: tap.total(),
            });
        }
        if !tap.is_fresh() {
            return Err(TransferError::InvariantViolation(
                "source was read before the request was built".into(),
            ));
        }

        let file_name = self.request.remote_name().ok_or_else(|| {
            TransferError::InvalidRequest(format!(
                "cannot derive a file name from {}",
                self.request.local_path().display()
            ))
        })?;
        validate_file_name(&file_name)?;

        let mut fields = Vec::new();
        if let Some(parent_id) = self.request.parent_id() {
            fields.push((FIELD_PARENT_ID, parent_id.to_string()));
        }
        if let Some(relative_path) = self.request.relative_path() {
            validate_relative_path(relative_path)?;
            fields.push((FIELD_RELATIVE_PATH, relative_path.to_string()));
        }
        Ok((file_name, fields))
    }
}
