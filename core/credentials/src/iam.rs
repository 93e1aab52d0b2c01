//! AWS IAM and STS query API client.
//!
//! Requests are form-encoded POSTs signed with Signature Version 4. The
//! responses are small XML documents; the handful of values needed are
//! pulled out by element name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{header, Client};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use tracing::debug;

use crate::provider::{AccessKeyMetadata, AwsAccessKeys, CallerIdentity, NewAccessKey, SigningKey};
use credvault_common::{Error, Result};

/// IAM and STS global endpoints are signed for this region.
const REGION: &str = "us-east-1";

const IAM_HOST: &str = "iam.amazonaws.com";
const IAM_VERSION: &str = "2010-05-08";
const STS_HOST: &str = "sts.amazonaws.com";
const STS_VERSION: &str = "2011-06-15";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
const SIGNED_HEADERS: &str = "content-type;host;x-amz-date";

type HmacSha256 = Hmac<Sha256>;

/// Query API endpoint: host plus the service name used in the signature.
#[derive(Debug, Clone, Copy)]
struct Service {
    name: &'static str,
    host: &'static str,
    version: &'static str,
}

const IAM: Service = Service {
    name: "iam",
    host: IAM_HOST,
    version: IAM_VERSION,
};

const STS: Service = Service {
    name: "sts",
    host: STS_HOST,
    version: STS_VERSION,
};

/// IAM/STS client.
pub struct IamClient {
    http: Client,
}

impl IamClient {
    /// Create a new client.
    ///
    /// # Errors
    /// - `Network` if the HTTP client cannot be built
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("credvault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    async fn call(
        &self,
        service: Service,
        key: &SigningKey,
        action: &str,
        params: &[(&str, &str)],
    ) -> Result<String> {
        let mut body = format!("Action={}&Version={}", action, service.version);
        for (name, value) in params {
            check_query_value(value)?;
            body.push('&');
            body.push_str(name);
            body.push('=');
            body.push_str(value);
        }

        let signed = sign_request(service, key, &body, Utc::now());
        debug!(service = service.name, action, "Calling AWS");

        let response = self
            .http
            .post(format!("https://{}/", service.host))
            .header(header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header("x-amz-date", &signed.amz_date)
            .header(header::AUTHORIZATION, &signed.authorization)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("{} request failed: {}", action, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("Failed to read {} response: {}", action, e)))?;

        if !status.is_success() {
            let code = element(&text, "Code").map_or_else(|| "Error".into(), unescape);
            let message = element(&text, "Message").map_or_else(|| "no message".into(), unescape);
            return Err(Error::Network(format!(
                "{} returned {}: {}: {}",
                action, status, code, message
            )));
        }
        Ok(text)
    }
}

#[async_trait]
impl AwsAccessKeys for IamClient {
    async fn caller_identity(&self, key: &SigningKey) -> Result<CallerIdentity> {
        let xml = self.call(STS, key, "GetCallerIdentity", &[]).await?;
        Ok(CallerIdentity {
            arn: required(&xml, "Arn")?,
            account: required(&xml, "Account")?,
            user_id: required(&xml, "UserId")?,
        })
    }

    async fn list_access_keys(&self, key: &SigningKey) -> Result<Vec<AccessKeyMetadata>> {
        let xml = self.call(IAM, key, "ListAccessKeys", &[]).await?;
        Ok(elements(&xml, "member")
            .into_iter()
            .filter_map(|member| {
                Some(AccessKeyMetadata {
                    access_key_id: element(member, "AccessKeyId")?.to_string(),
                    status: element(member, "Status").unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    async fn create_access_key(&self, key: &SigningKey) -> Result<NewAccessKey> {
        let xml = self.call(IAM, key, "CreateAccessKey", &[]).await?;
        Ok(NewAccessKey {
            access_key_id: required(&xml, "AccessKeyId")?,
            secret_access_key: required(&xml, "SecretAccessKey")?,
        })
    }

    async fn delete_access_key(&self, key: &SigningKey, access_key_id: &str) -> Result<()> {
        self.call(IAM, key, "DeleteAccessKey", &[("AccessKeyId", access_key_id)])
            .await
            .map(drop)
    }
}

/// Headers produced by signing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SignedRequest {
    amz_date: String,
    authorization: String,
}

fn sign_request(service: Service, key: &SigningKey, body: &str, now: DateTime<Utc>) -> SignedRequest {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let scope = format!("{}/{}/{}/aws4_request", date, REGION, service.name);

    let canonical_request = format!(
        "POST\n/\n\ncontent-type:{}\nhost:{}\nx-amz-date:{}\n\n{}\n{}",
        FORM_CONTENT_TYPE,
        service.host,
        amz_date,
        SIGNED_HEADERS,
        hex::encode(Sha256::digest(body.as_bytes()))
    );
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let signing_key = derive_signing_key(&key.secret_access_key, &date, REGION, service.name);
    let signature = hex::encode(hmac(&signing_key, string_to_sign.as_bytes()));

    SignedRequest {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            key.access_key_id, scope, SIGNED_HEADERS, signature
        ),
        amz_date,
    }
}

fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{}", secret).as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Values are placed in the form body unescaped.
fn check_query_value(value: &str) -> Result<()> {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "'{}' is not a valid AWS identifier",
            value
        )))
    }
}

/// Text of the first `<tag>...</tag>` element.
fn element<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = start + xml[start..].find(&close)?;
    Some(xml[start..end].trim())
}

/// Text of every `<tag>...</tag>` element, in document order.
fn elements<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut found = Vec::new();
    let mut rest = xml;
    while let Some(at) = rest.find(&open) {
        let start = at + open.len();
        let Some(len) = rest[start..].find(&close) else {
            break;
        };
        found.push(&rest[start..start + len]);
        rest = &rest[start + len + close.len()..];
    }
    found
}

fn required(xml: &str, tag: &str) -> Result<String> {
    element(xml, tag)
        .map(|text| unescape(text).into_owned())
        .ok_or_else(|| Error::Network(format!("AWS response lacks <{}>", tag)))
}

/// Decode the predefined XML entities.
fn unescape(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];
        let decoded = [
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&amp;", '&'),
            ("&quot;", '"'),
            ("&apos;", '\''),
        ]
        .into_iter()
        .find(|(entity, _)| rest.starts_with(entity));
        match decoded {
            Some((entity, c)) => {
                out.push(c);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}
