use super::{str_at, RestBackend, RestRequest};
use crate::api::abstraction::NetworkApi;
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::types::IscsiInitiatorAuth;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Initiator name the array uses for the SVM-wide default security entry
const DEFAULT_INITIATOR: &str = "default";

fn chap_body(auth: &IscsiInitiatorAuth) -> Value {
    let mut chap = Map::new();
    if !auth.chap_user.is_empty() {
        chap.insert(
            "inbound".into(),
            json!({ "user": auth.chap_user, "password": auth.chap_passphrase }),
        );
    }
    if !auth.chap_outbound_user.is_empty() {
        chap.insert(
            "outbound".into(),
            json!({ "user": auth.chap_outbound_user, "password": auth.chap_outbound_passphrase }),
        );
    }
    let mut body = json!({ "authentication_type": auth.auth_type });
    if !chap.is_empty() {
        body["chap"] = Value::Object(chap);
    }
    body
}

impl RestBackend {
    async fn data_lif_records(&self, site: &CallSite<'_>, protocol: Option<&str>) -> Result<Vec<Value>> {
        let mut request = self
            .scoped(RestRequest::get("/network/ip/interfaces"))
            .fields(&["ip.address", "state", "services"]);
        if let Some(protocol) = protocol {
            request = request.query("services", format!("data_{}", protocol));
        }
        self.collect(site, request).await
    }
}

#[async_trait]
impl NetworkApi for RestBackend {
    async fn iscsi_initiator_get_default_auth(&self, ctx: &RequestContext) -> Result<IscsiInitiatorAuth> {
        self.facade
            .call(ctx, "IscsiInitiatorGetDefaultAuth", &self.svm, async {
                let site = CallSite::new("IscsiInitiatorGetDefaultAuth", "iscsi-security", &self.svm);
                let request = self
                    .scoped(RestRequest::get("/protocols/san/iscsi/credentials"))
                    .query("initiator", DEFAULT_INITIATOR)
                    .fields(&["authentication_type", "chap.inbound.user", "chap.outbound.user"]);
                let record = self
                    .first(&site, request)
                    .await?
                    .ok_or_else(|| Error::not_found("iscsi-security", &self.svm))?;
                Ok(IscsiInitiatorAuth {
                    svm: self.svm.clone(),
                    auth_type: str_at(&record, "/authentication_type"),
                    chap_user: str_at(&record, "/chap/inbound/user"),
                    chap_passphrase: String::new(),
                    chap_outbound_user: str_at(&record, "/chap/outbound/user"),
                    chap_outbound_passphrase: String::new(),
                })
            })
            .await
    }

    async fn iscsi_initiator_set_default_auth(&self, ctx: &RequestContext, auth: &IscsiInitiatorAuth) -> Result<()> {
        self.facade
            .call(ctx, "IscsiInitiatorSetDefaultAuth", &self.svm, async {
                let site = CallSite::new("IscsiInitiatorSetDefaultAuth", "iscsi-security", &self.svm);
                let lookup = self
                    .scoped(RestRequest::get("/protocols/san/iscsi/credentials"))
                    .query("initiator", DEFAULT_INITIATOR)
                    .fields(&["svm.uuid"]);
                let record = self
                    .first(&site, lookup)
                    .await?
                    .ok_or_else(|| Error::not_found("iscsi-security", &self.svm))?;
                let svm_uuid = str_at(&record, "/svm/uuid");
                let request = RestRequest::patch(
                    format!("/protocols/san/iscsi/credentials/{}/{}", svm_uuid, DEFAULT_INITIATOR),
                    chap_body(auth),
                );
                self.mutate(&site, request).await.map(|_| ())
            })
            .await
    }

    async fn iscsi_interface_get(&self, ctx: &RequestContext, svm: &str) -> Result<Vec<String>> {
        self.facade
            .call(ctx, "IscsiInterfaceGet", svm, async {
                let site = CallSite::new("IscsiInterfaceGet", "iscsi-interface", svm);
                let request = RestRequest::get("/network/ip/interfaces")
                    .query("svm.name", svm)
                    .query("services", "data_iscsi")
                    .fields(&["ip.address", "enabled"]);
                let records = self.collect(&site, request).await?;
                Ok(records
                    .iter()
                    .filter(|r| r.pointer("/enabled").and_then(Value::as_bool).unwrap_or(true))
                    .map(|r| str_at(r, "/ip/address"))
                    .filter(|a| !a.is_empty())
                    .map(|address| format!("{}:3260", address))
                    .collect())
            })
            .await
    }

    async fn fcp_interface_get(&self, ctx: &RequestContext, svm: &str) -> Result<Vec<String>> {
        self.facade
            .call(ctx, "FcpInterfaceGet", svm, async {
                let site = CallSite::new("FcpInterfaceGet", "fcp-interface", svm);
                let request = RestRequest::get("/network/fc/interfaces")
                    .query("svm.name", svm)
                    .fields(&["wwpn"]);
                let records = self.collect(&site, request).await?;
                Ok(records
                    .iter()
                    .map(|r| str_at(r, "/wwpn"))
                    .filter(|w| !w.is_empty())
                    .collect())
            })
            .await
    }

    async fn iscsi_node_get_name(&self, ctx: &RequestContext) -> Result<String> {
        self.facade
            .call(ctx, "IscsiNodeGetName", &self.svm, async {
                let site = CallSite::new("IscsiNodeGetName", "iscsi-service", &self.svm);
                let request = self
                    .scoped(RestRequest::get("/protocols/san/iscsi/services"))
                    .fields(&["target.name"]);
                let record = self.first(&site, request).await?;
                match record.map(|r| str_at(&r, "/target/name")) {
                    Some(name) if !name.is_empty() => Ok(name),
                    _ => Err(Error::not_found("iscsi-service", &self.svm)),
                }
            })
            .await
    }

    async fn net_interface_get_data_lifs(&self, ctx: &RequestContext, protocol: &str) -> Result<Vec<String>> {
        self.facade
            .call(ctx, "NetInterfaceGetDataLifs", protocol, async {
                let site = CallSite::new("NetInterfaceGetDataLifs", "net-interface", protocol);
                let records = self.data_lif_records(&site, Some(protocol)).await?;
                Ok(records
                    .iter()
                    .filter(|r| matches!(str_at(r, "/state").as_str(), "" | "up"))
                    .map(|r| str_at(r, "/ip/address"))
                    .filter(|a| !a.is_empty())
                    .collect())
            })
            .await
    }

    async fn reported_data_lifs(&self, ctx: &RequestContext) -> Result<(String, Vec<String>)> {
        self.facade
            .call(ctx, "ReportedDataLifs", &self.svm, async {
                let site = CallSite::new("ReportedDataLifs", "net-interface", &self.svm);
                let records = self.data_lif_records(&site, None).await?;
                let addresses = records
                    .iter()
                    .filter(|r| {
                        r.get("services")
                            .and_then(Value::as_array)
                            .map_or(true, |s| s.iter().any(|svc| svc.as_str().is_some_and(|n| n.starts_with("data_"))))
                    })
                    .map(|r| str_at(r, "/ip/address"))
                    .filter(|a| !a.is_empty())
                    .collect();
                Ok((self.svm.clone(), addresses))
            })
            .await
    }
}
