use super::{str_at, uuid_of, RestBackend, RestRequest};
use crate::api::abstraction::IgroupApi;
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::types::Igroup;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::debug;

fn parse_igroup(record: &Value) -> Igroup {
    Igroup {
        name: str_at(record, "/name"),
        igroup_type: str_at(record, "/protocol"),
        os_type: str_at(record, "/os_type"),
        initiators: record
            .get("initiators")
            .and_then(Value::as_array)
            .map(|list| list.iter().map(|i| str_at(i, "/name")).filter(|n| !n.is_empty()).collect())
            .unwrap_or_default(),
    }
}

impl RestBackend {
    async fn find_igroup(&self, site: &CallSite<'_>, name: &str) -> Result<Option<(String, Igroup)>> {
        let request = self
            .scoped(RestRequest::get("/protocols/san/igroups"))
            .query("name", name)
            .fields(&["uuid", "name", "protocol", "os_type", "initiators.name"]);
        let records = self.collect(site, request).await?;
        match records.iter().find(|r| str_at(r, "/name") == name) {
            Some(record) => Ok(Some((uuid_of(site, record, "/uuid")?, parse_igroup(record)))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl IgroupApi for RestBackend {
    async fn igroup_create(&self, ctx: &RequestContext, name: &str, igroup_type: &str, os_type: &str) -> Result<()> {
        self.facade
            .call(ctx, "IgroupCreate", name, async {
                let site = CallSite::new("IgroupCreate", "igroup", name);
                let requested = Igroup {
                    name: name.to_string(),
                    igroup_type: igroup_type.to_string(),
                    os_type: os_type.to_string(),
                    initiators: BTreeSet::new(),
                };
                let accept = |existing: &Igroup| match requested.conflicts_with(existing) {
                    Some(reason) => Err(Error::conflict("igroup", name, reason)),
                    None => {
                        debug!(igroup = name, "Igroup already exists");
                        Ok(())
                    }
                };

                if let Some((_, existing)) = self.find_igroup(&site, name).await? {
                    return accept(&existing);
                }

                let request = RestRequest::post(
                    "/protocols/san/igroups",
                    json!({
                        "name": name,
                        "svm": { "name": self.svm },
                        "protocol": igroup_type,
                        "os_type": os_type,
                    }),
                );
                match self.mutate(&site, request).await {
                    Ok(_) => Ok(()),
                    Err(e) if e.is_already_exists() => {
                        let (_, existing) = self
                            .find_igroup(&site, name)
                            .await?
                            .ok_or_else(|| Error::not_found("igroup", name))?;
                        accept(&existing)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
    }

    async fn igroup_destroy(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        self.facade
            .call(ctx, "IgroupDestroy", name, async {
                let site = CallSite::new("IgroupDestroy", "igroup", name);
                let Some((uuid, _)) = self.find_igroup(&site, name).await? else {
                    return Ok(());
                };
                match self
                    .mutate(&site, RestRequest::delete(format!("/protocols/san/igroups/{}", uuid)))
                    .await
                {
                    Err(e) if e.is_not_found() => Ok(()),
                    other => other.map(|_| ()),
                }
            })
            .await
    }

    async fn ensure_igroup_added(&self, ctx: &RequestContext, name: &str, initiator: &str) -> Result<()> {
        self.facade
            .call(ctx, "EnsureIgroupAdded", name, async {
                let site = CallSite::new("EnsureIgroupAdded", "igroup", name);
                let (uuid, igroup) = self
                    .find_igroup(&site, name)
                    .await?
                    .ok_or_else(|| Error::not_found("igroup", name))?;
                if igroup.initiators.contains(initiator) {
                    return Ok(());
                }

                let request = RestRequest::post(
                    format!("/protocols/san/igroups/{}/initiators", uuid),
                    json!({ "name": initiator }),
                );
                match self.mutate(&site, request).await {
                    Err(e) if e.is_already_exists() => Ok(()),
                    other => other.map(|_| ()),
                }
            })
            .await
    }

    async fn igroup_remove(&self, ctx: &RequestContext, name: &str, initiator: &str, force: bool) -> Result<()> {
        self.facade
            .call(ctx, "IgroupRemove", name, async {
                let site = CallSite::new("IgroupRemove", "igroup", name);
                let Some((uuid, igroup)) = self.find_igroup(&site, name).await? else {
                    return Ok(());
                };
                if !igroup.initiators.contains(initiator) {
                    return Ok(());
                }
                let request = RestRequest::delete(format!("/protocols/san/igroups/{}/initiators/{}", uuid, initiator))
                    .query("allow_delete_while_mapped", force);
                match self.mutate(&site, request).await {
                    Err(e) if e.is_not_found() => Ok(()),
                    other => other.map(|_| ()),
                }
            })
            .await
    }

    async fn igroup_get_by_name(&self, ctx: &RequestContext, name: &str) -> Result<BTreeSet<String>> {
        self.facade
            .call(ctx, "IgroupGetByName", name, async {
                let site = CallSite::new("IgroupGetByName", "igroup", name);
                self.find_igroup(&site, name)
                    .await?
                    .map(|(_, g)| g.initiators)
                    .ok_or_else(|| Error::not_found("igroup", name))
            })
            .await
    }
}
