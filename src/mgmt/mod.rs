//! Azure Resource Manager clients.
//!
//! ARM resources are plain JSON over `https://management.azure.com`, with the
//! API version passed as `api-version` and list results returned as
//! `{ "value": [...], "nextLink": "..." }`.

pub mod application_insights;

pub use application_insights::ApplicationInsightsManagementClient;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::errors::{Error, Result};
use crate::pager::{Page, Pager};
use crate::pipeline::Pipeline;

/// Public-cloud Resource Manager endpoint.
pub const ARM_ENDPOINT: &str = "https://management.azure.com";

/// OAuth scope for Resource Manager.
pub const ARM_SCOPE: &str = "https://management.azure.com/.default";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResult<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    next_link: Option<String>,
}

/// Page through an ARM list starting at `first`, following `nextLink`.
pub(crate) fn list_by_next_link<T>(pipeline: Pipeline, first: url::Url) -> Pager<T>
where
    T: DeserializeOwned + Send + 'static,
{
    Pager::new(None, move |next_link| {
        let pipeline = pipeline.clone();
        let first = first.clone();
        async move {
            let url = match next_link {
                Some(link) => url::Url::parse(&link)
                    .map_err(|e| Error::decode(format!("invalid nextLink '{}': {}", link, e)))?,
                None => first,
            };
            let list: ListResult<T> = pipeline.send(pipeline.client().get(url)).await?.json()?;
            Ok(Page::new(list.value, list.next_link))
        }
    })
}
