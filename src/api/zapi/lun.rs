//! ZAPI LUN management and LUN mapping

use super::{query, ZapiBackend, ZapiElement};
use crate::api::abstraction::LunApi;
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::fault::{self, FaultPoint};
use crate::api::pagination;
use crate::api::types::{self, Lun, QosPolicyGroup, QosPolicyGroupKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::debug;

fn parse_lun(record: &ZapiElement) -> Lun {
    let qos = match (
        record.text_of("qos-policy-group"),
        record.text_of("qos-adaptive-policy-group"),
    ) {
        (Some(name), _) if !name.is_empty() && name != "none" => QosPolicyGroup::fixed(name),
        (_, Some(name)) if !name.is_empty() && name != "none" => QosPolicyGroup::adaptive(name),
        _ => QosPolicyGroup::none(),
    };

    Lun {
        name: record.path_string(&["path"]),
        size: record.path_u64(&["size"]).unwrap_or(0),
        comment: record.path_string(&["comment"]),
        os_type: record.path_string(&["multiprotocol-type"]),
        qos_policy_group: qos,
        space_reserved: record.path_bool(&["is-space-reservation-enabled"]),
        space_allocated: record.path_bool(&["is-space-alloc-enabled"]),
        serial_number: record.path_string(&["serial-number"]),
        mapped: record.path_bool(&["mapped"]).unwrap_or(false),
        online: record.path_bool(&["online"]).unwrap_or(false),
    }
}

/// `(igroup, lun id)` for every mapping of one LUN
fn parse_map_list(results: &ZapiElement) -> Vec<(String, i32)> {
    results
        .list("initiator-groups")
        .iter()
        .filter_map(|info| {
            let igroup = info.text_of("initiator-group-name")?;
            let id = info.text_of("lun-id")?.trim().parse().ok()?;
            Some((igroup.to_string(), id))
        })
        .collect()
}

impl ZapiBackend {
    async fn find_luns(&self, site: &CallSite<'_>, path: &str) -> Result<Vec<Lun>> {
        let records = self
            .iterate(site, || {
                ZapiElement::new("lun-get-iter").push(query(
                    ZapiElement::new("lun-info").child("path", path).child("vserver", &self.svm),
                ))
            })
            .await?;
        let luns = records.iter().map(parse_lun).filter(|l| !l.name.is_empty());
        Ok(pagination::assemble(luns, |l| l.name.clone()))
    }

    async fn find_lun(&self, site: &CallSite<'_>, path: &str) -> Result<Option<Lun>> {
        Ok(self.find_luns(site, path).await?.into_iter().find(|l| l.name == path))
    }

    async fn lun_get(&self, site: &CallSite<'_>, path: &str) -> Result<Lun> {
        self.find_lun(site, path)
            .await?
            .ok_or_else(|| Error::not_found("lun", path))
    }

    async fn lun_mappings(&self, site: &CallSite<'_>, path: &str) -> Result<Vec<(String, i32)>> {
        let request = ZapiElement::new("lun-map-list-info").child("path", path);
        let results = self.invoke(site, request).await?;
        Ok(parse_map_list(&results))
    }

    fn accept_existing_lun(&self, requested: &Lun, existing: &Lun) -> Result<()> {
        match requested.conflicts_with(existing) {
            Some(reason) => Err(Error::conflict("lun", &requested.name, reason)),
            None => {
                debug!(lun = %requested.name, "LUN already exists");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl LunApi for ZapiBackend {
    async fn lun_create(&self, ctx: &RequestContext, lun: &Lun) -> Result<()> {
        self.facade
            .call(ctx, "LunCreate", &lun.name, async {
                if let Some(feature) = lun.qos_policy_group.required_feature() {
                    self.require(feature)?;
                }
                let site = CallSite::new("LunCreate", "lun", &lun.name);

                if let Some(existing) = self.find_lun(&site, &lun.name).await? {
                    return self.accept_existing_lun(lun, &existing);
                }

                fault::check(self.options.fault_hook(), FaultPoint::LunCreate, &lun.name)?;

                let mut request = ZapiElement::new("lun-create-by-size")
                    .child("path", &lun.name)
                    .child("size", lun.size)
                    .child_opt("ostype", &lun.os_type)
                    .child_opt("comment", &lun.comment);
                if let Some(reserved) = lun.space_reserved {
                    request = request.child("space-reservation-enabled", reserved);
                }
                if let Some(allocated) = lun.space_allocated {
                    request = request.child("space-allocation-enabled", allocated);
                }
                if !lun.qos_policy_group.is_none() {
                    request = match lun.qos_policy_group.kind {
                        QosPolicyGroupKind::Adaptive => {
                            request.child("qos-adaptive-policy-group", &lun.qos_policy_group.name)
                        }
                        _ => request.child("qos-policy-group", &lun.qos_policy_group.name),
                    };
                }

                match self.invoke(&site, request).await {
                    Ok(_) => Ok(()),
                    Err(e) if e.is_already_exists() => {
                        let existing = self.lun_get(&site, &lun.name).await?;
                        self.accept_existing_lun(lun, &existing)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
    }

    async fn lun_destroy(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        self.facade
            .call(ctx, "LunDestroy", path, async {
                let site = CallSite::new("LunDestroy", "lun", path);
                let request = ZapiElement::new("lun-destroy").child("path", path);
                match self.invoke(&site, request).await {
                    Err(e) if e.is_not_found() => {
                        debug!(lun = path, "LUN already deleted");
                        Ok(())
                    }
                    other => other.map(|_| ()),
                }
            })
            .await
    }

    async fn lun_list(&self, ctx: &RequestContext, pattern: &str) -> Result<Vec<Lun>> {
        self.facade
            .call(ctx, "LunList", pattern, async {
                let matcher = pagination::name_pattern(pattern)?;
                let site = CallSite::new("LunList", "lun", pattern);
                let luns = self.find_luns(&site, pattern).await?;
                Ok(luns.into_iter().filter(|l| matcher.matches(&l.name)).collect())
            })
            .await
    }

    async fn lun_get_by_name(&self, ctx: &RequestContext, path: &str) -> Result<Lun> {
        self.facade
            .call(ctx, "LunGetByName", path, async {
                let site = CallSite::new("LunGetByName", "lun", path);
                self.lun_get(&site, path).await
            })
            .await
    }

    async fn lun_exists(&self, ctx: &RequestContext, path: &str) -> Result<bool> {
        self.facade
            .call(ctx, "LunExists", path, async {
                let site = CallSite::new("LunExists", "lun", path);
                Ok(self.find_lun(&site, path).await?.is_some())
            })
            .await
    }

    async fn lun_get_comment(&self, ctx: &RequestContext, path: &str) -> Result<(String, bool)> {
        self.facade
            .call(ctx, "LunGetComment", path, async {
                let site = CallSite::new("LunGetComment", "lun", path);
                Ok(match self.find_lun(&site, path).await? {
                    Some(lun) => (lun.comment, true),
                    None => (String::new(), false),
                })
            })
            .await
    }

    async fn lun_set_attribute(
        &self,
        ctx: &RequestContext,
        path: &str,
        attribute: &str,
        fstype: &str,
        context: &str,
    ) -> Result<()> {
        self.facade
            .call(ctx, "LunSetAttribute", path, async {
                fault::check(self.options.fault_hook(), FaultPoint::LunSetAttribute, path)?;
                let site = CallSite::new("LunSetAttribute", "lun", path);

                let request = ZapiElement::new("lun-set-attribute")
                    .child("path", path)
                    .child("name", attribute)
                    .child("value", fstype);
                self.invoke(&site, request).await?;

                if !context.is_empty() {
                    let request = ZapiElement::new("lun-set-attribute")
                        .child("path", path)
                        .child("name", "context")
                        .child("value", context);
                    self.invoke(&site, request).await?;
                }
                Ok(())
            })
            .await
    }

    fn parse_lun_comment(&self, comment: &str) -> Result<IndexMap<String, String>> {
        types::parse_lun_comment(comment)
    }

    async fn lun_set_qos_policy_group(&self, ctx: &RequestContext, path: &str, qos: &QosPolicyGroup) -> Result<()> {
        self.facade
            .call(ctx, "LunSetQosPolicyGroup", path, async {
                if let Some(feature) = qos.required_feature() {
                    self.require(feature)?;
                }
                let site = CallSite::new("LunSetQosPolicyGroup", "lun", path);
                let request = ZapiElement::new("lun-set-qos-policy-group").child("path", path);
                let request = match qos.kind {
                    QosPolicyGroupKind::Adaptive => request.child("qos-adaptive-policy-group", &qos.name),
                    _ if qos.is_none() => request.child("qos-policy-group", "none"),
                    _ => request.child("qos-policy-group", &qos.name),
                };
                self.invoke(&site, request).await.map(|_| ())
            })
            .await
    }

    async fn lun_rename(&self, ctx: &RequestContext, path: &str, new_path: &str) -> Result<()> {
        self.facade
            .call(ctx, "LunRename", path, async {
                let site = CallSite::new("LunRename", "lun", path);
                let request = ZapiElement::new("lun-move")
                    .child("path", path)
                    .child("new-path", new_path);
                self.invoke(&site, request).await.map(|_| ())
            })
            .await
    }

    async fn lun_size(&self, ctx: &RequestContext, path: &str) -> Result<u64> {
        self.facade
            .call(ctx, "LunSize", path, async {
                let site = CallSite::new("LunSize", "lun", path);
                Ok(self.lun_get(&site, path).await?.size)
            })
            .await
    }

    async fn lun_set_size(&self, ctx: &RequestContext, path: &str, size: u64) -> Result<u64> {
        self.facade
            .call(ctx, "LunSetSize", path, async {
                let site = CallSite::new("LunSetSize", "lun", path);
                let request = ZapiElement::new("lun-resize")
                    .child("path", path)
                    .child("size", size);
                let results = self.invoke(&site, request).await?;
                Ok(results.path_u64(&["actual-size"]).unwrap_or(size))
            })
            .await
    }

    async fn lun_map_info(&self, ctx: &RequestContext, igroup: &str, path: &str) -> Result<i32> {
        self.facade
            .call(ctx, "LunMapInfo", path, async {
                let site = CallSite::new("LunMapInfo", "lun", path);
                let mappings = self.lun_mappings(&site, path).await?;
                Ok(mappings
                    .iter()
                    .find(|(name, _)| name == igroup)
                    .map(|(_, id)| *id)
                    .unwrap_or(-1))
            })
            .await
    }

    async fn ensure_lun_mapped(
        &self,
        ctx: &RequestContext,
        igroup: &str,
        path: &str,
        import_not_managed: bool,
    ) -> Result<i32> {
        self.facade
            .call(ctx, "EnsureLunMapped", path, async {
                let site = CallSite::new("EnsureLunMapped", "lun-map", path);
                let mappings = self.lun_mappings(&site, path).await?;

                if let Some((_, id)) = mappings.iter().find(|(name, _)| name == igroup) {
                    debug!(lun = path, igroup, lun_id = id, "LUN already mapped");
                    return Ok(*id);
                }
                if import_not_managed {
                    if let Some((other, id)) = mappings.first() {
                        debug!(lun = path, igroup = %other, lun_id = id, "Keeping existing mapping of unmanaged LUN");
                        return Ok(*id);
                    }
                }

                let request = ZapiElement::new("lun-map")
                    .child("initiator-group", igroup)
                    .child("path", path);
                match self.invoke(&site, request).await {
                    Ok(results) => results
                        .path_text(&["lun-id-assigned"])
                        .and_then(|id| id.trim().parse().ok())
                        .ok_or_else(|| Error::internal("EnsureLunMapped", "lun-map returned no LUN id")),
                    Err(e) if e.is_already_exists() => {
                        let mappings = self.lun_mappings(&site, path).await?;
                        mappings
                            .into_iter()
                            .find(|(name, _)| name == igroup)
                            .map(|(_, id)| id)
                            .ok_or(e)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
    }

    async fn lun_unmap(&self, ctx: &RequestContext, igroup: &str, path: &str) -> Result<()> {
        self.facade
            .call(ctx, "LunUnmap", path, async {
                let site = CallSite::new("LunUnmap", "lun-map", path);
                let request = ZapiElement::new("lun-unmap")
                    .child("initiator-group", igroup)
                    .child("path", path);
                match self.invoke(&site, request).await {
                    Err(e) if e.is_not_found() => Ok(()),
                    other => other.map(|_| ()),
                }
            })
            .await
    }

    async fn lun_map_get_reporting_nodes(&self, ctx: &RequestContext, igroup: &str, path: &str) -> Result<Vec<String>> {
        self.facade
            .call(ctx, "LunMapGetReportingNodes", path, async {
                let site = CallSite::new("LunMapGetReportingNodes", "lun-map", path);
                let records = self
                    .iterate(&site, || {
                        ZapiElement::new("lun-map-get-iter").push(query(
                            ZapiElement::new("lun-map-info")
                                .child("path", path)
                                .child("initiator-group", igroup),
                        ))
                    })
                    .await?;
                Ok(records
                    .iter()
                    .flat_map(|r| r.list("reporting-nodes").iter())
                    .filter_map(ZapiElement::text)
                    .map(str::to_string)
                    .collect())
            })
            .await
    }
}
