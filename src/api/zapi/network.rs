use super::{query, ZapiBackend, ZapiElement};
use crate::api::abstraction::NetworkApi;
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::types::IscsiInitiatorAuth;
use crate::error::{Error, Result};
use async_trait::async_trait;

impl ZapiBackend {
    async fn data_lif_records(&self, site: &CallSite<'_>, protocol: Option<&str>) -> Result<Vec<ZapiElement>> {
        self.iterate(site, || {
            let mut info = ZapiElement::new("net-interface-info")
                .child("role", "data")
                .child("vserver", &self.svm);
            if let Some(protocol) = protocol {
                info = info.push(ZapiElement::new("data-protocols").child("data-protocol", protocol));
            }
            ZapiElement::new("net-interface-get-iter").push(query(info))
        })
        .await
    }
}

#[async_trait]
impl NetworkApi for ZapiBackend {
    async fn iscsi_initiator_get_default_auth(&self, ctx: &RequestContext) -> Result<IscsiInitiatorAuth> {
        self.facade
            .call(ctx, "IscsiInitiatorGetDefaultAuth", &self.svm, async {
                let site = CallSite::new("IscsiInitiatorGetDefaultAuth", "iscsi-security", &self.svm);
                let results = self
                    .invoke(&site, ZapiElement::new("iscsi-initiator-get-default-auth"))
                    .await?;
                Ok(IscsiInitiatorAuth {
                    svm: self.svm.clone(),
                    auth_type: results.path_string(&["auth-type"]),
                    chap_user: results.path_string(&["user-name"]),
                    chap_passphrase: String::new(),
                    chap_outbound_user: results.path_string(&["outbound-user-name"]),
                    chap_outbound_passphrase: String::new(),
                })
            })
            .await
    }

    async fn iscsi_initiator_set_default_auth(&self, ctx: &RequestContext, auth: &IscsiInitiatorAuth) -> Result<()> {
        self.facade
            .call(ctx, "IscsiInitiatorSetDefaultAuth", &self.svm, async {
                let site = CallSite::new("IscsiInitiatorSetDefaultAuth", "iscsi-security", &self.svm);
                let request = ZapiElement::new("iscsi-initiator-set-default-auth")
                    .child("auth-type", &auth.auth_type)
                    .child_opt("user-name", &auth.chap_user)
                    .child_opt("passphrase", &auth.chap_passphrase)
                    .child_opt("outbound-user-name", &auth.chap_outbound_user)
                    .child_opt("outbound-passphrase", &auth.chap_outbound_passphrase);
                self.invoke(&site, request).await.map(|_| ())
            })
            .await
    }

    async fn iscsi_interface_get(&self, ctx: &RequestContext, svm: &str) -> Result<Vec<String>> {
        self.facade
            .call(ctx, "IscsiInterfaceGet", svm, async {
                let site = CallSite::new("IscsiInterfaceGet", "iscsi-interface", svm);
                let records = self
                    .iterate(&site, || {
                        ZapiElement::new("iscsi-interface-get-iter")
                            .push(query(ZapiElement::new("iscsi-interface-list-entry-info").child("vserver", svm)))
                    })
                    .await?;
                Ok(records
                    .iter()
                    .filter(|r| r.path_bool(&["is-interface-enabled"]).unwrap_or(true))
                    .filter_map(|r| {
                        let address = r.text_of("ip-address")?;
                        let port = r.text_of("ip-port").unwrap_or("3260");
                        Some(format!("{}:{}", address, port))
                    })
                    .collect())
            })
            .await
    }

    async fn fcp_interface_get(&self, ctx: &RequestContext, svm: &str) -> Result<Vec<String>> {
        self.facade
            .call(ctx, "FcpInterfaceGet", svm, async {
                let site = CallSite::new("FcpInterfaceGet", "fcp-interface", svm);
                let records = self
                    .iterate(&site, || {
                        ZapiElement::new("fcp-interface-get-iter")
                            .push(query(ZapiElement::new("fcp-interface-info").child("vserver", svm)))
                    })
                    .await?;
                Ok(records
                    .iter()
                    .filter_map(|r| r.text_of("port-name"))
                    .map(str::to_string)
                    .collect())
            })
            .await
    }

    async fn iscsi_node_get_name(&self, ctx: &RequestContext) -> Result<String> {
        self.facade
            .call(ctx, "IscsiNodeGetName", &self.svm, async {
                let site = CallSite::new("IscsiNodeGetName", "iscsi-service", &self.svm);
                let results = self.invoke(&site, ZapiElement::new("iscsi-node-get-name")).await?;
                results
                    .text_of("node-name")
                    .map(str::to_string)
                    .ok_or_else(|| Error::not_found("iscsi-service", &self.svm))
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
                    .filter(|r| r.text_of("operational-status").map_or(true, |s| s == "up"))
                    .filter_map(|r| r.text_of("address"))
                    .map(str::to_string)
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
                    .filter_map(|r| r.text_of("address"))
                    .map(str::to_string)
                    .collect();
                Ok((self.svm.clone(), addresses))
            })
            .await
    }
}
