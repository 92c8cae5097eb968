use super::{query, ZapiBackend, ZapiElement};
use crate::api::abstraction::IgroupApi;
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::types::Igroup;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::debug;

fn parse_igroup(record: &ZapiElement) -> Igroup {
    Igroup {
        name: record.path_string(&["initiator-group-name"]),
        igroup_type: record.path_string(&["initiator-group-type"]),
        os_type: record.path_string(&["initiator-group-os-type"]),
        initiators: record
            .list("initiators")
            .iter()
            .filter_map(|i| i.text_of("initiator-name"))
            .map(str::to_string)
            .collect(),
    }
}

impl ZapiBackend {
    async fn find_igroup(&self, site: &CallSite<'_>, name: &str) -> Result<Option<Igroup>> {
        let records = self
            .iterate(site, || {
                ZapiElement::new("igroup-get-iter").push(query(
                    ZapiElement::new("initiator-group-info")
                        .child("initiator-group-name", name)
                        .child("vserver", &self.svm),
                ))
            })
            .await?;
        Ok(records.iter().map(parse_igroup).find(|g| g.name == name))
    }
}

#[async_trait]
impl IgroupApi for ZapiBackend {
    async fn igroup_create(&self, ctx: &RequestContext, name: &str, igroup_type: &str, os_type: &str) -> Result<()> {
        self.facade
            .call(ctx, "IgroupCreate", name, async {
                let site = CallSite::new("IgroupCreate", "igroup", name);
                let request = ZapiElement::new("igroup-create")
                    .child("initiator-group-name", name)
                    .child("initiator-group-type", igroup_type)
                    .child("os-type", os_type);
                match self.invoke(&site, request).await {
                    Ok(_) => Ok(()),
                    Err(e) if e.is_already_exists() => {
                        let requested = Igroup {
                            name: name.to_string(),
                            igroup_type: igroup_type.to_string(),
                            os_type: os_type.to_string(),
                            initiators: BTreeSet::new(),
                        };
                        let existing = self
                            .find_igroup(&site, name)
                            .await?
                            .ok_or_else(|| Error::not_found("igroup", name))?;
                        match requested.conflicts_with(&existing) {
                            Some(reason) => Err(Error::conflict("igroup", name, reason)),
                            None => {
                                debug!(igroup = name, "Igroup already exists");
                                Ok(())
                            }
                        }
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
                let request = ZapiElement::new("igroup-destroy").child("initiator-group-name", name);
                match self.invoke(&site, request).await {
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
                let igroup = self
                    .find_igroup(&site, name)
                    .await?
                    .ok_or_else(|| Error::not_found("igroup", name))?;
                if igroup.initiators.contains(initiator) {
                    return Ok(());
                }

                let request = ZapiElement::new("igroup-add")
                    .child("initiator-group-name", name)
                    .child("initiator", initiator);
                match self.invoke(&site, request).await {
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
                let request = ZapiElement::new("igroup-remove")
                    .child("initiator-group-name", name)
                    .child("initiator", initiator)
                    .child("force", force);
                match self.invoke(&site, request).await {
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
                    .map(|g| g.initiators)
                    .ok_or_else(|| Error::not_found("igroup", name))
            })
            .await
    }
}
