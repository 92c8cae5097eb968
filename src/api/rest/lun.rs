//! REST LUN management and LUN mapping

use super::{bool_at, str_at, u64_at, uuid_of, RestBackend, RestRequest};
use crate::api::abstraction::LunApi;
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::fault::{self, FaultPoint};
use crate::api::pagination;
use crate::api::types::{self, Lun, QosPolicyGroup};
use crate::error::{Error, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::debug;

const LUN_FIELDS: &[&str] = &[
    "uuid",
    "name",
    "space.size",
    "space.guarantee.requested",
    "space.scsi_thin_provisioning_support_enabled",
    "comment",
    "os_type",
    "qos_policy.name",
    "serial_number",
    "status.mapped",
    "status.state",
];

fn parse_lun(record: &Value) -> Lun {
    let qos = match str_at(record, "/qos_policy/name") {
        name if name.is_empty() || name == "none" => QosPolicyGroup::none(),
        name => QosPolicyGroup::fixed(name),
    };
    Lun {
        name: str_at(record, "/name"),
        size: u64_at(record, "/space/size").unwrap_or(0),
        comment: str_at(record, "/comment"),
        os_type: str_at(record, "/os_type"),
        qos_policy_group: qos,
        space_reserved: bool_at(record, "/space/guarantee/requested"),
        space_allocated: bool_at(record, "/space/scsi_thin_provisioning_support_enabled"),
        serial_number: str_at(record, "/serial_number"),
        mapped: bool_at(record, "/status/mapped").unwrap_or(false),
        online: str_at(record, "/status/state") == "online",
    }
}

fn create_body(svm: &str, lun: &Lun) -> Value {
    let mut space = Map::new();
    space.insert("size".into(), json!(lun.size));
    if let Some(reserved) = lun.space_reserved {
        space.insert("guarantee".into(), json!({ "requested": reserved }));
    }
    if let Some(allocated) = lun.space_allocated {
        space.insert("scsi_thin_provisioning_support_enabled".into(), json!(allocated));
    }

    let mut body = Map::new();
    body.insert("svm".into(), json!({ "name": svm }));
    body.insert("name".into(), json!(lun.name));
    body.insert("space".into(), Value::Object(space));
    if !lun.os_type.is_empty() {
        body.insert("os_type".into(), json!(lun.os_type));
    }
    if !lun.comment.is_empty() {
        body.insert("comment".into(), json!(lun.comment));
    }
    if !lun.qos_policy_group.is_none() {
        body.insert("qos_policy".into(), json!({ "name": lun.qos_policy_group.name }));
    }
    Value::Object(body)
}

/// One LUN mapping as the array reports it
struct LunMap {
    igroup: String,
    igroup_uuid: String,
    lun_uuid: String,
    lun_id: i32,
}

impl RestBackend {
    async fn find_luns(&self, site: &CallSite<'_>, path: &str) -> Result<Vec<(String, Lun)>> {
        let request = self
            .scoped(RestRequest::get("/storage/luns"))
            .query("name", path)
            .fields(LUN_FIELDS);
        let records = self.collect(site, request).await?;
        let luns = records
            .iter()
            .map(|r| (str_at(r, "/uuid"), parse_lun(r)))
            .filter(|(_, lun)| !lun.name.is_empty());
        Ok(pagination::assemble(luns, |(_, lun)| lun.name.clone()))
    }

    async fn find_lun(&self, site: &CallSite<'_>, path: &str) -> Result<Option<(String, Lun)>> {
        Ok(self
            .find_luns(site, path)
            .await?
            .into_iter()
            .find(|(_, lun)| lun.name == path))
    }

    async fn lun_get(&self, site: &CallSite<'_>, path: &str) -> Result<(String, Lun)> {
        let (uuid, lun) = self
            .find_lun(site, path)
            .await?
            .ok_or_else(|| Error::not_found("lun", path))?;
        if uuid.is_empty() {
            return Err(Error::internal(site.operation, format!("LUN {} has no uuid", path)));
        }
        Ok((uuid, lun))
    }

    async fn lun_maps(&self, site: &CallSite<'_>, path: &str, igroup: Option<&str>) -> Result<Vec<LunMap>> {
        let mut request = self
            .scoped(RestRequest::get("/protocols/san/lun-maps"))
            .query("lun.name", path)
            .fields(&["igroup.name", "igroup.uuid", "lun.uuid", "logical_unit_number"]);
        if let Some(igroup) = igroup {
            request = request.query("igroup.name", igroup);
        }
        let records = self.collect(site, request).await?;
        Ok(records
            .iter()
            .filter_map(|r| {
                Some(LunMap {
                    igroup: str_at(r, "/igroup/name"),
                    igroup_uuid: str_at(r, "/igroup/uuid"),
                    lun_uuid: str_at(r, "/lun/uuid"),
                    lun_id: i32::try_from(u64_at(r, "/logical_unit_number")?).ok()?,
                })
            })
            .collect())
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

    /// Create the attribute, or overwrite it when the LUN already carries it
    async fn put_lun_attribute(&self, site: &CallSite<'_>, lun_uuid: &str, name: &str, value: &str) -> Result<()> {
        let create = RestRequest::post(
            format!("/storage/luns/{}/attributes", lun_uuid),
            json!({ "name": name, "value": value }),
        );
        match self.mutate(site, create).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_exists() => {
                let update = RestRequest::patch(
                    format!("/storage/luns/{}/attributes/{}", lun_uuid, name),
                    json!({ "value": value }),
                );
                self.mutate(site, update).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl LunApi for RestBackend {
    async fn lun_create(&self, ctx: &RequestContext, lun: &Lun) -> Result<()> {
        self.facade
            .call(ctx, "LunCreate", &lun.name, async {
                if let Some(feature) = lun.qos_policy_group.required_feature() {
                    self.require(feature)?;
                }
                let site = CallSite::new("LunCreate", "lun", &lun.name);

                if let Some((_, existing)) = self.find_lun(&site, &lun.name).await? {
                    return self.accept_existing_lun(lun, &existing);
                }

                fault::check(self.options.fault_hook(), FaultPoint::LunCreate, &lun.name)?;

                let request = RestRequest::post("/storage/luns", create_body(&self.svm, lun));
                match self.mutate(&site, request).await {
                    Ok(_) => Ok(()),
                    Err(e) if e.is_already_exists() => {
                        let (_, existing) = self.lun_get(&site, &lun.name).await?;
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
                let Some((uuid, _)) = self.find_lun(&site, path).await? else {
                    debug!(lun = path, "LUN already deleted");
                    return Ok(());
                };
                match self.mutate(&site, RestRequest::delete(format!("/storage/luns/{}", uuid))).await {
                    Err(e) if e.is_not_found() => Ok(()),
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
                Ok(luns
                    .into_iter()
                    .map(|(_, lun)| lun)
                    .filter(|l| matcher.matches(&l.name))
                    .collect())
            })
            .await
    }

    async fn lun_get_by_name(&self, ctx: &RequestContext, path: &str) -> Result<Lun> {
        self.facade
            .call(ctx, "LunGetByName", path, async {
                let site = CallSite::new("LunGetByName", "lun", path);
                Ok(self.lun_get(&site, path).await?.1)
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
                    Some((_, lun)) => (lun.comment, true),
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
                let (uuid, _) = self.lun_get(&site, path).await?;

                self.put_lun_attribute(&site, &uuid, attribute, fstype).await?;
                if !context.is_empty() {
                    self.put_lun_attribute(&site, &uuid, "context", context).await?;
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
                let (uuid, _) = self.lun_get(&site, path).await?;
                let policy = if qos.is_none() { "none" } else { qos.name.as_str() };
                let request = RestRequest::patch(
                    format!("/storage/luns/{}", uuid),
                    json!({ "qos_policy": { "name": policy } }),
                );
                self.mutate(&site, request).await.map(|_| ())
            })
            .await
    }

    async fn lun_rename(&self, ctx: &RequestContext, path: &str, new_path: &str) -> Result<()> {
        self.facade
            .call(ctx, "LunRename", path, async {
                let site = CallSite::new("LunRename", "lun", path);
                let (uuid, _) = self.lun_get(&site, path).await?;
                let request = RestRequest::patch(format!("/storage/luns/{}", uuid), json!({ "name": new_path }));
                self.mutate(&site, request).await.map(|_| ())
            })
            .await
    }

    async fn lun_size(&self, ctx: &RequestContext, path: &str) -> Result<u64> {
        self.facade
            .call(ctx, "LunSize", path, async {
                let site = CallSite::new("LunSize", "lun", path);
                Ok(self.lun_get(&site, path).await?.1.size)
            })
            .await
    }

    async fn lun_set_size(&self, ctx: &RequestContext, path: &str, size: u64) -> Result<u64> {
        self.facade
            .call(ctx, "LunSetSize", path, async {
                let site = CallSite::new("LunSetSize", "lun", path);
                let (uuid, _) = self.lun_get(&site, path).await?;
                let request = RestRequest::patch(format!("/storage/luns/{}", uuid), json!({ "space": { "size": size } }));
                self.mutate(&site, request).await?;
                // The array rounds sizes; report what it applied
                Ok(match self.find_lun(&site, path).await? {
                    Some((_, lun)) if lun.size > 0 => lun.size,
                    _ => size,
                })
            })
            .await
    }

    async fn lun_map_info(&self, ctx: &RequestContext, igroup: &str, path: &str) -> Result<i32> {
        self.facade
            .call(ctx, "LunMapInfo", path, async {
                let site = CallSite::new("LunMapInfo", "lun", path);
                let maps = self.lun_maps(&site, path, None).await?;
                Ok(maps
                    .iter()
                    .find(|m| m.igroup == igroup)
                    .map(|m| m.lun_id)
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
                let maps = self.lun_maps(&site, path, None).await?;

                if let Some(map) = maps.iter().find(|m| m.igroup == igroup) {
                    debug!(lun = path, igroup, lun_id = map.lun_id, "LUN already mapped");
                    return Ok(map.lun_id);
                }
                if import_not_managed {
                    if let Some(map) = maps.first() {
                        debug!(lun = path, igroup = %map.igroup, lun_id = map.lun_id, "Keeping existing mapping of unmanaged LUN");
                        return Ok(map.lun_id);
                    }
                }

                let request = RestRequest::post(
                    "/protocols/san/lun-maps",
                    json!({
                        "svm": { "name": self.svm },
                        "igroup": { "name": igroup },
                        "lun": { "name": path },
                    }),
                )
                .query("return_records", "true");
                match self.mutate(&site, request).await {
                    Ok(response) => {
                        let assigned = response
                            .records()
                            .first()
                            .and_then(|r| u64_at(r, "/logical_unit_number"))
                            .and_then(|id| i32::try_from(id).ok());
                        match assigned {
                            Some(id) => Ok(id),
                            None => self
                                .lun_maps(&site, path, Some(igroup))
                                .await?
                                .into_iter()
                                .find(|m| m.igroup == igroup)
                                .map(|m| m.lun_id)
                                .ok_or_else(|| Error::internal("EnsureLunMapped", "lun map returned no LUN id")),
                        }
                    }
                    Err(e) if e.is_already_exists() => self
                        .lun_maps(&site, path, Some(igroup))
                        .await?
                        .into_iter()
                        .find(|m| m.igroup == igroup)
                        .map(|m| m.lun_id)
                        .ok_or(e),
                    Err(e) => Err(e),
                }
            })
            .await
    }

    async fn lun_unmap(&self, ctx: &RequestContext, igroup: &str, path: &str) -> Result<()> {
        self.facade
            .call(ctx, "LunUnmap", path, async {
                let site = CallSite::new("LunUnmap", "lun-map", path);
                let maps = self.lun_maps(&site, path, Some(igroup)).await?;
                let Some(map) = maps.into_iter().find(|m| m.igroup == igroup) else {
                    return Ok(());
                };
                let request = RestRequest::delete(format!(
                    "/protocols/san/lun-maps/{}/{}",
                    map.lun_uuid, map.igroup_uuid
                ));
                match self.mutate(&site, request).await {
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
                let request = self
                    .scoped(RestRequest::get("/protocols/san/lun-maps"))
                    .query("lun.name", path)
                    .query("igroup.name", igroup)
                    .fields(&["reporting_nodes.name"]);
                let records = self.collect(&site, request).await?;
                Ok(records
                    .iter()
                    .filter_map(|r| r.get("reporting_nodes").and_then(Value::as_array))
                    .flatten()
                    .map(|node| str_at(node, "/name"))
                    .filter(|n| !n.is_empty())
                    .collect())
            })
            .await
    }
}
