use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;

use super::{GatewaySession, GatewayStatus, GatewayVerdict, PaymentGateway, PaymentInit};

/// Hosted-checkout client for SSLCommerz-style gateways.
pub struct SslCommerzGateway {
    base_url: String,
    store_id: String,
    store_password: String,
    client: reqwest::Client,
}

impl SslCommerzGateway {
    pub fn new(
        base_url: String,
        store_id: String,
        store_password: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build payment gateway client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            store_id,
            store_password,
            client,
        })
    }

    fn init_form(&self, request: &PaymentInit) -> Vec<(&'static str, String)> {
        let customer = &request.customer;
        vec![
            ("store_id", self.store_id.clone()),
            ("store_passwd", self.store_password.clone()),
            ("total_amount", format!("{}.00", request.amount)),
            ("currency", request.currency.clone()),
            ("tran_id", request.transaction_id.clone()),
            ("success_url", request.callbacks.success.clone()),
            ("fail_url", request.callbacks.fail.clone()),
            ("cancel_url", request.callbacks.cancel.clone()),
            ("ipn_url", request.callbacks.ipn.clone()),
            ("product_name", request.product_name.clone()),
            ("product_category", request.product_category.clone()),
            ("product_profile", "non-physical-goods".to_string()),
            ("cus_name", customer.name.clone()),
            ("cus_email", customer.email.clone()),
            ("cus_phone", customer.phone.clone()),
            ("cus_add1", customer.address.clone()),
            ("cus_city", customer.city.clone()),
            ("cus_country", "Bangladesh".to_string()),
            // Nothing ships; the event venue stands in for the shipping address.
            ("shipping_method", "NO".to_string()),
            ("ship_name", customer.name.clone()),
            ("ship_add1", customer.address.clone()),
            ("ship_city", customer.city.clone()),
            ("ship_country", "Bangladesh".to_string()),
        ]
    }
}

fn parse_init_response(data: &Value) -> anyhow::Result<GatewaySession> {
    let status = data["status"].as_str().unwrap_or("");
    if !status.eq_ignore_ascii_case("SUCCESS") {
        let reason = data["failedreason"].as_str().unwrap_or("unknown reason");
        anyhow::bail!("gateway rejected session ({status}): {reason}");
    }

    let redirect_url = data["GatewayPageURL"]
        .as_str()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing GatewayPageURL in gateway response"))?;

    Ok(GatewaySession {
        redirect_url: redirect_url.to_string(),
        session_key: data["sessionkey"].as_str().map(|s| s.to_string()),
    })
}

fn parse_query_response(data: &Value) -> GatewayVerdict {
    let elements = match data["element"].as_array() {
        Some(elements) if !elements.is_empty() => elements,
        _ => return GatewayVerdict::Pending,
    };

    let mut failed = false;
    for element in elements {
        match GatewayStatus::parse(element["status"].as_str().unwrap_or("")) {
            GatewayStatus::Valid => {
                return GatewayVerdict::Valid {
                    validation_id: element["val_id"].as_str().map(|s| s.to_string()),
                };
            }
            GatewayStatus::Failed | GatewayStatus::Cancelled => failed = true,
            GatewayStatus::Unknown => {}
        }
    }

    if failed {
        GatewayVerdict::Failed
    } else {
        GatewayVerdict::Pending
    }
}

#[async_trait]
impl PaymentGateway for SslCommerzGateway {
    async fn init_payment(&self, request: &PaymentInit) -> anyhow::Result<GatewaySession> {
        let url = format!("{}/gwprocess/v4/api.php", self.base_url);

        let resp = self
            .client
            .post(&url)
            .form(&self.init_form(request))
            .send()
            .await
            .context("failed to call payment gateway")?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .context("failed to parse payment gateway response")?;

        if !status.is_success() {
            anyhow::bail!("payment gateway error ({}): {}", status, data);
        }

        parse_init_response(&data)
    }

    async fn query_transaction(&self, transaction_id: &str) -> anyhow::Result<GatewayVerdict> {
        let url = format!(
            "{}/validator/api/merchantTransIDvalidationAPI.php",
            self.base_url
        );

        let data: Value = self
            .client
            .get(&url)
            .query(&[
                ("tran_id", transaction_id),
                ("store_id", self.store_id.as_str()),
                ("store_passwd", self.store_password.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .context("failed to query payment gateway")?
            .error_for_status()
            .context("payment gateway query returned error")?
            .json()
            .await
            .context("failed to parse payment gateway query response")?;

        Ok(parse_query_response(&data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_init_success() {
        let session = parse_init_response(&json!({
            "status": "SUCCESS",
            "GatewayPageURL": "https://sandbox.example/pay/abc",
            "sessionkey": "abc",
        }))
        .unwrap();
        assert_eq!(session.redirect_url, "https://sandbox.example/pay/abc");
        assert_eq!(session.session_key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_init_without_redirect_is_error() {
        assert!(parse_init_response(&json!({"status": "SUCCESS", "GatewayPageURL": ""})).is_err());
        assert!(parse_init_response(&json!({"status": "FAILED", "failedreason": "Store Credential Error"})).is_err());
    }

    #[test]
    fn test_parse_query_verdicts() {
        let valid = parse_query_response(&json!({
            "APIConnect": "DONE",
            "element": [
                {"status": "FAILED", "val_id": null},
                {"status": "VALIDATED", "val_id": "VAL-9"}
            ]
        }));
        assert_eq!(
            valid,
            GatewayVerdict::Valid {
                validation_id: Some("VAL-9".to_string())
            }
        );

        let failed = parse_query_response(&json!({"element": [{"status": "FAILED"}]}));
        assert_eq!(failed, GatewayVerdict::Failed);

        let nothing = parse_query_response(&json!({"APIConnect": "DONE", "no_of_trans_found": 0}));
        assert_eq!(nothing, GatewayVerdict::Pending);
    }

    #[test]
    fn test_init_form_mirrors_event_address_as_shipping() {
        let gateway = SslCommerzGateway::new(
            "https://sandbox.example/".to_string(),
            "store".to_string(),
            "secret".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        let request = PaymentInit {
            transaction_id: "TXN-1".to_string(),
            amount: 10_000,
            currency: "BDT".to_string(),
            product_name: "Gold".to_string(),
            product_category: "photography".to_string(),
            customer: super::super::PaymentCustomer {
                name: "Nadia".to_string(),
                email: "nadia@example.com".to_string(),
                phone: "+8801700000000".to_string(),
                address: "House 12, Road 5".to_string(),
                city: "Dhaka".to_string(),
            },
            callbacks: super::super::CallbackUrls {
                success: "https://api.example/api/payments/success".to_string(),
                fail: "https://api.example/api/payments/fail".to_string(),
                cancel: "https://api.example/api/payments/cancel".to_string(),
                ipn: "https://api.example/api/payments/ipn".to_string(),
            },
        };

        let form = gateway.init_form(&request);
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };
        assert_eq!(get("total_amount"), "10000.00");
        assert_eq!(get("ship_add1"), "House 12, Road 5");
        assert_eq!(get("ship_city"), "Dhaka");
        assert_eq!(get("ipn_url"), "https://api.example/api/payments/ipn");
        assert_eq!(gateway.base_url, "https://sandbox.example");
    }
}
