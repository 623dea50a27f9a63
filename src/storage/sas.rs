//! Shared access signature generation.
//!
//! Service SAS tokens (files, shares, blobs, containers) and account SAS
//! tokens are signed with the account key over a version-specific
//! string-to-sign.  The output is a query string without a leading `?`.

use chrono::{DateTime, Utc};

use super::{format_iso8601, STORAGE_API_VERSION};
use crate::auth::SharedKeyCredential;
use crate::errors::{Error, Result};

macro_rules! permissions {
    (
        $(#[$doc:meta])*
        $name:ident { $($field:ident => $ch:literal),+ $(,)? }
    ) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name {
            $(pub $field: bool,)+
        }

        impl $name {
            /// Parse a permission string such as `"rw"`; unknown letters are rejected.
            pub fn parse(s: &str) -> Result<Self> {
                let mut p = Self::default();
                for c in s.chars() {
                    match c {
                        $($ch => p.$field = true,)+
                        other => {
                            return Err(Error::invalid(format!(
                                "invalid permission '{}' for {}",
                                other,
                                stringify!($name)
                            )))
                        }
                    }
                }
                Ok(p)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                $(if self.$field { f.write_str(concat!($ch))?; })+
                Ok(())
            }
        }
    };
}

permissions!(
    /// Permissions of a file SAS, rendered in `rcwd` order.
    FileSasPermissions { read => 'r', create => 'c', write => 'w', delete => 'd' }
);

permissions!(
    /// Permissions of a share SAS, rendered in `rcwdl` order.
    ShareSasPermissions { read => 'r', create => 'c', write => 'w', delete => 'd', list => 'l' }
);

permissions!(
    /// Permissions of a blob or container SAS.
    BlobSasPermissions {
        read => 'r',
        add => 'a',
        create => 'c',
        write => 'w',
        delete => 'd',
        delete_previous_version => 'x',
        permanent_delete => 'y',
        list => 'l',
        tag => 't',
        move_ => 'm',
        execute => 'e',
    }
);

permissions!(
    /// Permissions of an account SAS.
    AccountSasPermissions {
        read => 'r',
        write => 'w',
        delete => 'd',
        delete_previous_version => 'x',
        permanent_delete => 'y',
        list => 'l',
        add => 'a',
        create => 'c',
        update => 'u',
        process => 'p',
        tag => 't',
        filter_by_tags => 'f',
    }
);

permissions!(
    /// Resource types an account SAS covers (`sco`).
    ResourceTypes { service => 's', container => 'c', object => 'o' }
);

permissions!(
    /// Services an account SAS covers (`bqtf`).
    Services { blob => 'b', queue => 'q', table => 't', file => 'f' }
);

/// Options shared by every service SAS.
#[derive(Debug, Clone, Default)]
pub struct SasOptions {
    /// Permission string; may be omitted when `policy_id` supplies it.
    pub permission: Option<String>,
    /// May be omitted when `policy_id` supplies it.
    pub expiry: Option<DateTime<Utc>>,
    pub start: Option<DateTime<Utc>>,
    /// Stored access policy (signed identifier) to reference.
    pub policy_id: Option<String>,
    /// Single IP or range (`168.1.5.60-168.1.5.70`).
    pub ip: Option<String>,
    /// `https` or `https,http`.
    pub protocol: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_type: Option<String>,
}

impl SasOptions {
    pub fn new(permission: impl std::fmt::Display, expiry: DateTime<Utc>) -> Self {
        Self {
            permission: Some(permission.to_string()),
            expiry: Some(expiry),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.policy_id.is_none() && (self.permission.is_none() || self.expiry.is_none()) {
            return Err(Error::invalid(
                "permission and expiry are required unless a stored access policy is referenced",
            ));
        }
        Ok(())
    }

    fn response_headers(&self) -> [(&'static str, &str); 5] {
        [
            ("rscc", self.cache_control.as_deref().unwrap_or("")),
            ("rscd", self.content_disposition.as_deref().unwrap_or("")),
            ("rsce", self.content_encoding.as_deref().unwrap_or("")),
            ("rscl", self.content_language.as_deref().unwrap_or("")),
            ("rsct", self.content_type.as_deref().unwrap_or("")),
        ]
    }
}

/// Ordered query parameters with empty values skipped on output.
#[derive(Default)]
struct SasQuery(Vec<(&'static str, String)>);

impl SasQuery {
    fn add(&mut self, name: &'static str, value: Option<impl Into<String>>) {
        if let Some(v) = value {
            let v = v.into();
            if !v.is_empty() {
                self.0.push((name, v));
            }
        }
    }

    fn finish(self) -> String {
        let mut out = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.0 {
            out.append_pair(k, v);
        }
        out.finish()
    }
}

fn opt_time(value: &Option<DateTime<Utc>>) -> String {
    value.as_ref().map(format_iso8601).unwrap_or_default()
}

fn service_sas(
    credential: &SharedKeyCredential,
    canonical_resource: String,
    signed_resource: &str,
    snapshot_time: Option<&str>,
    options: &SasOptions,
) -> Result<String> {
    options.validate()?;
    let permission = options.permission.clone().unwrap_or_default();
    let start = opt_time(&options.start);
    let expiry = opt_time(&options.expiry);
    let ip = options.ip.clone().unwrap_or_default();
    let protocol = options.protocol.clone().unwrap_or_default();
    let policy_id = options.policy_id.clone().unwrap_or_default();

    let mut sts = [
        permission.as_str(),
        start.as_str(),
        expiry.as_str(),
        canonical_resource.as_str(),
        policy_id.as_str(),
        ip.as_str(),
        protocol.as_str(),
        STORAGE_API_VERSION,
    ]
    .join("\n");
    if let Some(snapshot_time) = snapshot_time {
        // Blob SAS also signs sr, snapshot time and an (empty) encryption scope.
        sts.push('\n');
        sts.push_str(signed_resource);
        sts.push('\n');
        sts.push_str(snapshot_time);
        sts.push('\n');
    }
    for (_, value) in options.response_headers() {
        sts.push('\n');
        sts.push_str(value);
    }

    let signature = credential.sign(&sts)?;

    let mut q = SasQuery::default();
    q.add("sv", Some(STORAGE_API_VERSION));
    q.add("st", Some(start));
    q.add("se", Some(expiry));
    q.add("sp", Some(permission));
    q.add("sip", Some(ip));
    q.add("spr", Some(protocol));
    q.add("sr", Some(signed_resource));
    q.add("si", Some(policy_id));
    for (name, value) in options.response_headers() {
        q.add(name, Some(value));
    }
    q.add("sig", Some(signature));
    Ok(q.finish())
}

/// SAS for a single file.
pub fn generate_file_sas(
    credential: &SharedKeyCredential,
    share_name: &str,
    file_path: &str,
    options: &SasOptions,
) -> Result<String> {
    let resource = format!(
        "/file/{}/{}/{}",
        credential.account(),
        share_name,
        file_path.trim_matches('/')
    );
    service_sas(credential, resource, "f", None, options)
}

/// SAS for a whole share.
pub fn generate_share_sas(
    credential: &SharedKeyCredential,
    share_name: &str,
    options: &SasOptions,
) -> Result<String> {
    let resource = format!("/file/{}/{}", credential.account(), share_name);
    service_sas(credential, resource, "s", None, options)
}

/// SAS for a blob (or one of its snapshots).
pub fn generate_blob_sas(
    credential: &SharedKeyCredential,
    container_name: &str,
    blob_name: &str,
    snapshot: Option<&str>,
    options: &SasOptions,
) -> Result<String> {
    let resource = format!(
        "/blob/{}/{}/{}",
        credential.account(),
        container_name,
        blob_name.trim_matches('/')
    );
    let (signed_resource, snapshot_time) = match snapshot {
        Some(s) => ("bs", s),
        None => ("b", ""),
    };
    let mut token = service_sas(
        credential,
        resource,
        signed_resource,
        Some(snapshot_time),
        options,
    )?;
    if let Some(s) = snapshot {
        let encoded: String = url::form_urlencoded::byte_serialize(s.as_bytes()).collect();
        token.push_str(&format!("&snapshot={}", encoded));
    }
    Ok(token)
}

/// SAS for a container (or Data Lake file system).
pub fn generate_container_sas(
    credential: &SharedKeyCredential,
    container_name: &str,
    options: &SasOptions,
) -> Result<String> {
    let resource = format!("/blob/{}/{}", credential.account(), container_name);
    service_sas(credential, resource, "c", Some(""), options)
}

/// Optional fields of an account SAS.
#[derive(Debug, Clone, Default)]
pub struct AccountSasOptions {
    pub start: Option<DateTime<Utc>>,
    pub ip: Option<String>,
    pub protocol: Option<String>,
}

/// Account-level SAS.
pub fn generate_account_sas(
    credential: &SharedKeyCredential,
    services: Services,
    resource_types: ResourceTypes,
    permission: AccountSasPermissions,
    expiry: DateTime<Utc>,
    options: &AccountSasOptions,
) -> Result<String> {
    let start = opt_time(&options.start);
    let expiry = format_iso8601(&expiry);
    let permission = permission.to_string();
    let services = services.to_string();
    let resource_types = resource_types.to_string();
    let ip = options.ip.as_deref().unwrap_or("");
    let protocol = options.protocol.as_deref().unwrap_or("");

    // Trailing empty line is the (unused) encryption scope.
    let sts = format!(
        "{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n\n",
        credential.account(),
        permission,
        services,
        resource_types,
        start,
        expiry,
        ip,
        protocol,
        STORAGE_API_VERSION
    );
    let signature = credential.sign(&sts)?;

    let mut q = SasQuery::default();
    q.add("sv", Some(STORAGE_API_VERSION));
    q.add("ss", Some(services));
    q.add("srt", Some(resource_types));
    q.add("st", Some(start));
    q.add("se", Some(expiry));
    q.add("sp", Some(permission));
    q.add("sip", Some(ip));
    q.add("spr", Some(protocol));
    q.add("sig", Some(signature));
    Ok(q.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credential() -> SharedKeyCredential {
        SharedKeyCredential::new("acct", "dGVzdGtleQ==").unwrap()
    }

    fn expiry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn pairs(token: &str) -> Vec<(String, String)> {
        url::form_urlencoded::parse(token.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_permission_order() {
        let p = FileSasPermissions {
            delete: true,
            read: true,
            ..Default::default()
        };
        assert_eq!(p.to_string(), "rd");
        assert_eq!(BlobSasPermissions::parse("wr").unwrap().to_string(), "rw");
        assert_eq!(
            AccountSasPermissions::parse("lrw").unwrap().to_string(),
            "rwl"
        );
        assert!(FileSasPermissions::parse("z").is_err());
        let rt = ResourceTypes {
            object: true,
            service: true,
            container: false,
        };
        assert_eq!(rt.to_string(), "so");
    }

    #[test]
    fn test_file_sas_signature_matches_string_to_sign() {
        let cred = credential();
        let options = SasOptions::new(
            FileSasPermissions {
                read: true,
                ..Default::default()
            },
            expiry(),
        );
        let token = generate_file_sas(&cred, "share", "dir/file.txt", &options).unwrap();
        let p = pairs(&token);
        let sig = p.iter().find(|(k, _)| k == "sig").unwrap().1.clone();

        let sts = "r\n\n2026-03-01T12:00:00Z\n/file/acct/share/dir/file.txt\n\n\n\n2023-11-03\n\n\n\n\n";
        assert_eq!(sig, cred.sign(sts).unwrap());
        assert!(p.contains(&("sr".into(), "f".into())));
        assert!(p.contains(&("sp".into(), "r".into())));
        assert!(!p.iter().any(|(k, _)| k == "st"));
    }

    #[test]
    fn test_blob_sas_string_to_sign() {
        let cred = credential();
        let mut options = SasOptions::new("r", expiry());
        options.content_type = Some("text/plain".into());
        let token = generate_blob_sas(&cred, "c", "b.txt", None, &options).unwrap();
        let p = pairs(&token);
        let sig = p.iter().find(|(k, _)| k == "sig").unwrap().1.clone();

        let sts = "r\n\n2026-03-01T12:00:00Z\n/blob/acct/c/b.txt\n\n\n\n2023-11-03\nb\n\n\n\n\n\n\ntext/plain";
        assert_eq!(sig, cred.sign(sts).unwrap());
        assert!(p.contains(&("rsct".into(), "text/plain".into())));
    }

    #[test]
    fn test_policy_id_allows_missing_permission() {
        let cred = credential();
        let options = SasOptions {
            policy_id: Some("testid".into()),
            ..Default::default()
        };
        let token = generate_share_sas(&cred, "share", &options).unwrap();
        assert!(pairs(&token).contains(&("si".into(), "testid".into())));

        let missing = SasOptions::default();
        assert!(generate_share_sas(&cred, "share", &missing).is_err());
    }

    #[test]
    fn test_account_sas_fields() {
        let cred = credential();
        let token = generate_account_sas(
            &cred,
            Services {
                file: true,
                ..Default::default()
            },
            ResourceTypes {
                object: true,
                ..Default::default()
            },
            AccountSasPermissions::parse("r").unwrap(),
            expiry(),
            &AccountSasOptions {
                protocol: Some("https".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let p = pairs(&token);
        assert!(p.contains(&("ss".into(), "f".into())));
        assert!(p.contains(&("srt".into(), "o".into())));
        assert!(p.contains(&("spr".into(), "https".into())));
        let sts = "acct\nr\nf\no\n\n2026-03-01T12:00:00Z\n\nhttps\n2023-11-03\n\n";
        let sig = p.iter().find(|(k, _)| k == "sig").unwrap().1.clone();
        assert_eq!(sig, cred.sign(sts).unwrap());
    }
}
