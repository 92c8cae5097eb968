use super::{str_at, u64_at, uuid_of, RestBackend, RestRequest};
use crate::api::abstraction::ExportPolicyApi;
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::types::by_client_match;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Client matches of one rule, joined the way ZAPI reports them
fn client_match(rule: &Value) -> String {
    rule.get("clients")
        .and_then(Value::as_array)
        .map(|clients| {
            clients
                .iter()
                .map(|c| str_at(c, "/match"))
                .filter(|m| !m.is_empty())
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

impl RestBackend {
    /// Numeric policy id, or `None` when the policy is absent
    async fn export_policy_id(&self, site: &CallSite<'_>, policy: &str) -> Result<Option<String>> {
        let request = self
            .scoped(RestRequest::get("/protocols/nfs/export-policies"))
            .query("name", policy)
            .fields(&["id", "name"]);
        let records = self.collect(site, request).await?;
        match records.iter().find(|r| str_at(r, "/name") == policy) {
            Some(record) => uuid_of(site, record, "/id").map(Some),
            None => Ok(None),
        }
    }

    async fn require_export_policy_id(&self, site: &CallSite<'_>, policy: &str) -> Result<String> {
        self.export_policy_id(site, policy)
            .await?
            .ok_or_else(|| Error::not_found("export-policy", policy))
    }

    /// Rules keyed by index; several rules may share a client match
    async fn export_rules_by_index(&self, site: &CallSite<'_>, policy_id: &str) -> Result<BTreeMap<u32, String>> {
        let request = RestRequest::get(format!("/protocols/nfs/export-policies/{}/rules", policy_id))
            .fields(&["index", "clients.match"]);
        let records = self.collect(site, request).await?;
        Ok(records
            .iter()
            .filter_map(|r| {
                let index = u32::try_from(u64_at(r, "/index")?).ok()?;
                let clients = client_match(r);
                (!clients.is_empty()).then_some((index, clients))
            })
            .collect())
    }

    async fn export_rules(&self, site: &CallSite<'_>, policy_id: &str) -> Result<BTreeMap<String, u32>> {
        Ok(by_client_match(self.export_rules_by_index(site, policy_id).await?))
    }
}

#[async_trait]
impl ExportPolicyApi for RestBackend {
    async fn export_policy_create(&self, ctx: &RequestContext, policy: &str) -> Result<()> {
        self.facade
            .call(ctx, "ExportPolicyCreate", policy, async {
                let site = CallSite::new("ExportPolicyCreate", "export-policy", policy);
                if self.export_policy_id(&site, policy).await?.is_some() {
                    debug!(policy, "Export policy already exists");
                    return Ok(());
                }
                let request = RestRequest::post(
                    "/protocols/nfs/export-policies",
                    json!({ "name": policy, "svm": { "name": self.svm } }),
                );
                match self.mutate(&site, request).await {
                    Err(e) if e.is_already_exists() => Ok(()),
                    other => other.map(|_| ()),
                }
            })
            .await
    }

    async fn export_policy_destroy(&self, ctx: &RequestContext, policy: &str) -> Result<()> {
        self.facade
            .call(ctx, "ExportPolicyDestroy", policy, async {
                let site = CallSite::new("ExportPolicyDestroy", "export-policy", policy);
                let Some(id) = self.export_policy_id(&site, policy).await? else {
                    return Ok(());
                };
                let request = RestRequest::delete(format!("/protocols/nfs/export-policies/{}", id));
                match self.mutate(&site, request).await {
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
                Ok(self.export_policy_id(&site, policy).await?.is_some())
            })
            .await
    }

    async fn export_rule_create(&self, ctx: &RequestContext, policy: &str, client_match: &str) -> Result<()> {
        self.facade
            .call(ctx, "ExportRuleCreate", policy, async {
                let site = CallSite::new("ExportRuleCreate", "export-rule", policy);
                let id = self.require_export_policy_id(&site, policy).await?;
                if self.export_rules(&site, &id).await?.contains_key(client_match) {
                    debug!(policy, client_match, "Export rule already present");
                    return Ok(());
                }

                let clients: Vec<Value> = client_match
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(|c| json!({ "match": c }))
                    .collect();
                let body = json!({
                    "clients": clients,
                    "protocols": ["any"],
                    "ro_rule": ["any"],
                    "rw_rule": ["any"],
                    "superuser": ["any"],
                });
                let request = RestRequest::post(format!("/protocols/nfs/export-policies/{}/rules", id), body);
                self.mutate(&site, request).await.map(|_| ())
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
                let Some(id) = self.export_policy_id(&site, policy).await? else {
                    return Ok(());
                };
                let rules = self.export_rules_by_index(&site, &id).await?;
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

                let request = RestRequest::delete(format!("/protocols/nfs/export-policies/{}/rules/{}", id, index));
                match self.mutate(&site, request).await {
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
                let id = self.require_export_policy_id(&site, policy).await?;
                self.export_rules(&site, &id).await
            })
            .await
    }
}
