//! Connection string parsing.
//!
//! Connection strings are `Key=Value` pairs separated by `;`.  Keys are
//! matched case-insensitively; values may themselves contain `=` (base64
//! keys, SAS tokens).

use std::collections::HashMap;

use crate::errors::{Error, Result};

fn parse_pairs(input: &str) -> Result<HashMap<String, String>> {
    let mut pairs = HashMap::new();
    for part in input.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| Error::invalid(format!("connection string segment '{}' has no '='", part)))?;
        pairs.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    if pairs.is_empty() {
        return Err(Error::invalid("connection string is empty"));
    }
    Ok(pairs)
}

/// Parsed storage account connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConnectionString {
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub sas_token: Option<String>,
    pub blob_endpoint: String,
    pub file_endpoint: String,
    pub dfs_endpoint: String,
}

impl StorageConnectionString {
    pub fn parse(input: &str) -> Result<Self> {
        let pairs = parse_pairs(input)?;
        let get = |k: &str| pairs.get(k).cloned().filter(|v| !v.is_empty());

        let account_name = get("accountname");
        let account_key = get("accountkey");
        let sas_token = get("sharedaccesssignature");
        if account_key.is_some() && account_name.is_none() {
            return Err(Error::invalid(
                "connection string has AccountKey but no AccountName",
            ));
        }

        let protocol = get("defaultendpointsprotocol").unwrap_or_else(|| "https".to_string());
        let suffix = get("endpointsuffix").unwrap_or_else(|| "core.windows.net".to_string());
        let endpoint = |explicit: &str, service: &str| -> Result<String> {
            if let Some(url) = get(explicit) {
                return Ok(url.trim_end_matches('/').to_string());
            }
            let account = account_name.as_deref().ok_or_else(|| {
                Error::invalid(format!(
                    "connection string needs AccountName or {}",
                    explicit
                ))
            })?;
            Ok(format!("{}://{}.{}.{}", protocol, account, service, suffix))
        };

        Ok(Self {
            blob_endpoint: endpoint("blobendpoint", "blob")?,
            file_endpoint: endpoint("fileendpoint", "file")?,
            dfs_endpoint: endpoint("dfsendpoint", "dfs")?,
            account_name,
            account_key,
            sas_token,
        })
    }
}

/// Parsed Service Bus / Event Hubs connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBusConnectionString {
    /// Host name, e.g. `myns.servicebus.windows.net`.
    pub fully_qualified_namespace: String,
    pub shared_access_key_name: String,
    pub shared_access_key: String,
    pub entity_path: Option<String>,
}

impl ServiceBusConnectionString {
    pub fn parse(input: &str) -> Result<Self> {
        let pairs = parse_pairs(input)?;
        let require = |k: &str, label: &str| {
            pairs
                .get(k)
                .cloned()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::invalid(format!("connection string is missing {}", label)))
        };

        let endpoint = require("endpoint", "Endpoint")?;
        let host = match endpoint.split_once("://") {
            Some((_, rest)) => rest,
            None => endpoint.as_str(),
        };
        let host = host.trim_end_matches('/').to_string();
        if host.is_empty() {
            return Err(Error::invalid("connection string Endpoint has no host"));
        }

        Ok(Self {
            fully_qualified_namespace: host,
            shared_access_key_name: require("sharedaccesskeyname", "SharedAccessKeyName")?,
            shared_access_key: require("sharedaccesskey", "SharedAccessKey")?,
            entity_path: pairs.get("entitypath").cloned().filter(|v| !v.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_account_key_string() {
        let cs = StorageConnectionString::parse(
            "DefaultEndpointsProtocol=https;AccountName=myacct;AccountKey=a2V5==;EndpointSuffix=core.windows.net",
        )
        .unwrap();
        assert_eq!(cs.account_name.as_deref(), Some("myacct"));
        assert_eq!(cs.account_key.as_deref(), Some("a2V5=="));
        assert_eq!(cs.file_endpoint, "https://myacct.file.core.windows.net");
        assert_eq!(cs.dfs_endpoint, "https://myacct.dfs.core.windows.net");
    }

    #[test]
    fn test_storage_explicit_endpoints_and_sas() {
        let cs = StorageConnectionString::parse(
            "BlobEndpoint=http://127.0.0.1:10000/devstoreaccount1/;FileEndpoint=http://127.0.0.1:10004/devstoreaccount1;DfsEndpoint=http://127.0.0.1:10000/devstoreaccount1;SharedAccessSignature=sv=2023-11-03&sig=abc%3D",
        )
        .unwrap();
        assert_eq!(cs.blob_endpoint, "http://127.0.0.1:10000/devstoreaccount1");
        assert_eq!(cs.sas_token.as_deref(), Some("sv=2023-11-03&sig=abc%3D"));
        assert!(cs.account_name.is_none());
    }

    #[test]
    fn test_storage_key_without_name_is_rejected() {
        assert!(StorageConnectionString::parse("AccountKey=abc").is_err());
        assert!(StorageConnectionString::parse("").is_err());
        assert!(StorageConnectionString::parse("garbage").is_err());
    }

    #[test]
    fn test_service_bus_string() {
        let cs = ServiceBusConnectionString::parse(
            "Endpoint=sb://myns.servicebus.windows.net/;SharedAccessKeyName=RootManageSharedAccessKey;SharedAccessKey=abc=;EntityPath=q1",
        )
        .unwrap();
        assert_eq!(cs.fully_qualified_namespace, "myns.servicebus.windows.net");
        assert_eq!(cs.shared_access_key_name, "RootManageSharedAccessKey");
        assert_eq!(cs.shared_access_key, "abc=");
        assert_eq!(cs.entity_path.as_deref(), Some("q1"));
    }

    #[test]
    fn test_service_bus_missing_key() {
        let err = ServiceBusConnectionString::parse("Endpoint=sb://ns.servicebus.windows.net/")
            .unwrap_err();
        assert!(err.to_string().contains("SharedAccessKeyName"));
    }
}
