use super::{query, ZapiBackend, ZapiElement};
use crate::api::abstraction::ExportPolicyApi;
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::types::by_client_match;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::debug;

impl ZapiBackend {
    /// Rules keyed by index; several rules may share a client match
    async fn export_rules_by_index(&self, site: &CallSite<'_>, policy: &str) -> Result<BTreeMap<u32, String>> {
        let records = self
            .iterate(site, || {
                ZapiElement::new("export-rule-get-iter").push(query(
                    ZapiElement::new("export-rule-info")
                        .child("policy-name", policy)
                        .child("vserver-name", &self.svm),
                ))
            })
            .await?;
        Ok(records
            .iter()
            .filter_map(|r| {
                let client_match = r.text_of("client-match")?;
                let index = u32::try_from(r.path_u64(&["rule-index"])?).ok()?;
                Some((index, client_match.to_string()))
            })
            .collect())
    }

    async fn export_rules(&self, site: &CallSite<'_>, policy: &str) -> Result<BTreeMap<String, u32>> {
        Ok(by_client_match(self.export_rules_by_index(site, policy).await?))
    }
}

#[async_trait]
impl ExportPolicyApi for ZapiBackend {
    async fn export_policy_create(&self, ctx: &RequestContext, policy: &str) -> Result<()> {
        self.facade
            .call(ctx, "ExportPolicyCreate", policy, async {
                let site = CallSite::new("ExportPolicyCreate", "export-policy", policy);
                let request = ZapiElement::new("export-policy-create").child("policy-name", policy);
                match self.invoke(&site, request).await {
                    Err(e) if e.is_already_exists() => {
                        debug!(policy, "Export policy already exists");
                        Ok(())
                    }
                    other => other.map(|_| ()),
                }
            })
            .await
    }

    async fn export_policy_destroy(&self, ctx: &RequestContext, policy: &str) -> Result<()> {
        self.facade
            .call(ctx, "ExportPolicyDestroy", policy, async {
                let site = CallSite::new("ExportPolicyDestroy", "export-policy", policy);
                let request = ZapiElement::new("export-policy-destroy").child("policy-name", policy);
                match self.invoke(&site, request).await {
                    Err(e) if e.is_not_found() => Ok(()),
                    other => other.map(|_| ()),
                }
            })
            .await
    }

    async fn export_policy_exists(&self, ctx: &RequestContext, policy: &str) -> Result<bool> {
        self.facade
            .call(ctx, "ExportPolicyExists", policy, async {
                let site = CallSite::new("ExportPolicyExists", "export-policy", policy);
                let records = self
                    .iterate(&site, || {
                        ZapiElement::new("export-policy-get-iter").push(query(
                            ZapiElement::new("export-policy-info")
                                .child("policy-name", policy)
                                .child("vserver", &self.svm),
                        ))
                    })
                    .await?;
                Ok(records.iter().any(|r| r.text_of("policy-name") == Some(policy)))
            })
            .await
    }

    async fn export_rule_create(&self, ctx: &RequestContext, policy: &str, client_match: &str) -> Result<()> {
        self.facade
            .call(ctx, "ExportRuleCreate", policy, async {
                let site = CallSite::new("ExportRuleCreate", "export-rule", policy);
                if self.export_rules(&site, policy).await?.contains_key(client_match) {
                    debug!(policy, client_match, "Export rule already present");
                    return Ok(());
                }

                let any = |name: &str| {
                    ZapiElement::new(name).push(ZapiElement::leaf("security-flavor", "any"))
                };
                let request = ZapiElement::new("export-rule-create")
                    .child("policy-name", policy)
                    .child("client-match", client_match)
                    .push(any("ro-rule"))
                    .push(any("rw-rule"))
                    .push(any("super-user-security"));
                self.invoke(&site, request).await.map(|_| ())
            })
            .await
    }

    async fn export_rule_destroy(
        &self,
        ctx: &RequestContext,
        policy: &str,
        index: u32,
        expected_client_match: &str,
    ) -> Result<()> {
        self.facade
            .call(ctx, "ExportRuleDestroy", policy, async {
                let site = CallSite::new("ExportRuleDestroy", "export-rule", policy);
                let rules = self.export_rules_by_index(&site, policy).await?;
                let Some(current) = rules.get(&index) else {
                    debug!(policy, index, "Export rule already gone");
                    return Ok(());
                };
                if current != expected_client_match {
                    return Err(Error::conflict(
                        "export-rule",
                        format!("{}#{}", policy, index),
                        format!("rule now matches '{}', expected '{}'", current, expected_client_match),
                    ));
                }

                let request = ZapiElement::new("export-rule-destroy")
                    .child("policy-name", policy)
                    .child("rule-index", index);
                match self.invoke(&site, request).await {
                    Err(e) if e.is_not_found() => Ok(()),
                    other => other.map(|_| ()),
                }
            })
            .await
    }

    async fn export_rule_list(&self, ctx: &RequestContext, policy: &str) -> Result<BTreeMap<String, u32>> {
        self.facade
            .call(ctx, "ExportRuleList", policy, async {
                let site = CallSite::new("ExportRuleList", "export-rule", policy);
                self.export_rules(&site, policy).await
            })
            .await
    }
}
