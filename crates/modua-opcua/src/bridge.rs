// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The OPC UA server and its coupling to the engine.
//!
//! The address space mirrors the project tree: a folder per channel,
//! device and group under the Objects folder, and one variable node per
//! resolved tag, node id `ns=<gateway>;s=<channel>/<device>/<group>/<tag>`.
//!
//! Data flows in two directions with different rules:
//!
//! - buffer → node: a polling action at the configured publish interval
//!   snapshots the [`DataBuffer`] and pushes changed entries (by
//!   `update_count`) into the nodes with `set_value_direct`, carrying the
//!   tag quality as the status code.
//! - client → device: writable nodes install a value setter that coerces
//!   the written variant to the tag's type and enqueues a
//!   [`WriteRequest`]. The node itself is never updated here; the value
//!   appears once the device scheduler has executed the write and
//!   re-read the covering block.

use std::collections::HashMap;
use std::sync::Arc;

use opcua::server::config::ANONYMOUS_USER_TOKEN_ID;
use opcua::server::prelude::*;
use opcua::sync::RwLock;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use modua_config::schema::{
    tag_path, OpcUaServerConfig, ProjectConfig, SecurityPolicyConfig, ResolvedTag,
};
use modua_core::types::{DeviceId, TagId, WriteOrigin, WriteRequest};
use modua_engine::{device_path, DataBuffer, WriteQueue};

use crate::error::BridgeError;
use crate::variant::{node_data_type, quality_status, value_to_variant, variant_to_value};

// =============================================================================
// Bridge
// =============================================================================

/// A running OPC UA server bound to the engine's shared state.
pub struct OpcUaBridge {
    server: Arc<RwLock<Server>>,
    task: JoinHandle<()>,
    endpoint: String,
    node_count: usize,
}

impl OpcUaBridge {
    /// Builds the address space from the project and starts the server.
    ///
    /// Tags that fail to resolve are skipped here without an error; the
    /// engine reports them when it builds its device specs.
    pub fn start(
        project: &ProjectConfig,
        buffer: Arc<DataBuffer>,
        writes: Arc<WriteQueue>,
    ) -> Result<Self, BridgeError> {
        let config = &project.opcua;
        let mut server = build_server(config)?;

        let nodes = Arc::new(build_address_space(&server, project, config, writes)?);
        let node_count = nodes.len();
        install_publish_action(&mut server, config, buffer, nodes);

        let endpoint = config.endpoint_url();
        let server = Arc::new(RwLock::new(server));
        let runner = server.clone();
        let task = tokio::task::spawn_blocking(move || Server::run_server(runner));

        info!(
            endpoint = %endpoint,
            nodes = node_count,
            publish_interval_ms = config.publish_interval_ms,
            "OPC UA server started"
        );

        Ok(Self {
            server,
            task,
            endpoint,
            node_count,
        })
    }

    /// The endpoint URL clients connect to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Number of tag variable nodes in the address space.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Aborts the server and waits for its task to exit.
    pub async fn stop(self) {
        self.server.write().abort();
        let _ = self.task.await;
        info!("OPC UA server stopped");
    }
}

impl std::fmt::Debug for OpcUaBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpcUaBridge")
            .field("endpoint", &self.endpoint)
            .field("nodes", &self.node_count)
            .finish()
    }
}

// =============================================================================
// Server Construction
// =============================================================================

/// Builds the server with one endpoint per configured security policy.
///
/// Only configured policies get an endpoint, so a session negotiating a
/// disabled policy is rejected by the stack outright.
fn build_server(config: &OpcUaServerConfig) -> Result<Server, BridgeError> {
    let mut token_ids: Vec<String> = Vec::new();
    if config.allow_anonymous {
        token_ids.push(ANONYMOUS_USER_TOKEN_ID.to_string());
    }
    for user in &config.users {
        token_ids.push(user.username.clone());
    }
    if token_ids.is_empty() {
        return Err(BridgeError::invalid_config(
            "no identities: anonymous access disabled and no users configured",
        ));
    }

    let mut builder = ServerBuilder::new()
        .application_name(config.application_name.as_str())
        .application_uri(config.application_uri.as_str())
        .product_uri(config.application_uri.as_str())
        .host_and_port(config.host.as_str(), config.port)
        .discovery_urls(vec!["/".to_string()])
        .pki_dir(config.pki_dir.as_str())
        .create_sample_keypair(config.has_secure_endpoint())
        .trust_client_certs();

    for user in &config.users {
        builder = builder.user_token(
            &user.username,
            ServerUserToken::user_pass(&user.username, &user.password),
        );
    }

    for policy in &config.security_policies {
        builder = match policy {
            SecurityPolicyConfig::None => {
                builder.endpoint("none", ServerEndpoint::new_none("/", &token_ids))
            }
            SecurityPolicyConfig::Basic128Rsa15 => builder.endpoint(
                "basic128rsa15",
                ServerEndpoint::new_basic128rsa15_sign_encrypt("/", &token_ids),
            ),
            SecurityPolicyConfig::Basic256 => builder.endpoint(
                "basic256",
                ServerEndpoint::new_basic256_sign_encrypt("/", &token_ids),
            ),
            SecurityPolicyConfig::Basic256Sha256 => builder.endpoint(
                "basic256sha256",
                ServerEndpoint::new_basic256sha256_sign_encrypt("/", &token_ids),
            ),
        };
    }

    builder
        .server()
        .ok_or_else(|| BridgeError::invalid_config(config.endpoint_url()))
}

// =============================================================================
// Address Space
// =============================================================================

/// Builds the folder hierarchy and tag variables, returning the tag id →
/// node id map the publish action works from.
fn build_address_space(
    server: &Server,
    project: &ProjectConfig,
    config: &OpcUaServerConfig,
    writes: Arc<WriteQueue>,
) -> Result<HashMap<TagId, NodeId>, BridgeError> {
    let address_space = server.address_space();
    let mut address_space = address_space.write();

    let ns = address_space
        .register_namespace(&config.namespace)
        .map_err(|_| BridgeError::Namespace(config.namespace.clone()))?;

    let mut nodes = HashMap::new();

    for channel in &project.channels {
        let channel_folder = address_space
            .add_folder(&channel.name, &channel.name, &NodeId::objects_folder_id())
            .map_err(|_| BridgeError::node_insert(&channel.name))?;

        for device in channel.devices.iter().filter(|d| d.enabled) {
            let device_folder = address_space
                .add_folder(&device.name, &device.name, &channel_folder)
                .map_err(|_| BridgeError::node_insert(&device.name))?;
            let device_id = DeviceId::new(device_path(&channel.name, &device.name));

            for group in &device.groups {
                let group_folder = address_space
                    .add_folder(&group.name, &group.name, &device_folder)
                    .map_err(|_| BridgeError::node_insert(&group.name))?;

                for tag_config in &group.tags {
                    let path = tag_path(&channel.name, &device.name, &group.name, &tag_config.name);
                    let tag = match tag_config.resolve(&path, &device.access) {
                        Ok(tag) => tag,
                        Err(_) => continue,
                    };

                    let node_id = NodeId::new(ns, path);
                    insert_tag_variable(
                        &mut address_space,
                        &node_id,
                        &group_folder,
                        &tag,
                        &device_id,
                        &writes,
                    );
                    nodes.insert(tag.id.clone(), node_id);
                }
            }
        }
    }

    Ok(nodes)
}

fn insert_tag_variable(
    address_space: &mut AddressSpace,
    node_id: &NodeId,
    parent: &NodeId,
    tag: &ResolvedTag,
    device: &DeviceId,
    writes: &Arc<WriteQueue>,
) {
    let mut builder = VariableBuilder::new(node_id, &tag.name, &tag.name)
        .organized_by(parent)
        .data_type(node_data_type(tag))
        .value(Variant::Empty);

    if let Some(description) = &tag.description {
        builder = builder.description(description.as_str());
    }

    if tag.is_writable() {
        let setter_tag = tag.clone();
        let setter_device = device.clone();
        let setter_writes = writes.clone();
        let setter = AttrFnSetter::new_boxed(
            move |_node: &NodeId, _attribute: AttributeId, _range: NumericRange, value: DataValue| {
                let variant = value.value.ok_or(StatusCode::BadTypeMismatch)?;
                let converted = variant_to_value(&variant, &setter_tag)
                    .ok_or(StatusCode::BadTypeMismatch)?;
                debug!(tag = %setter_tag.id, value = %converted, "Client write queued");
                setter_writes.enqueue(WriteRequest::new(
                    setter_tag.id.clone(),
                    setter_device.clone(),
                    converted,
                    WriteOrigin::OpcUa,
                ));
                // The node stays untouched until the device confirms the
                // write and the covering block is re-read.
                Ok(())
            },
        );
        builder = builder.writable().value_setter(setter);
    }

    if !builder.insert(address_space) {
        warn!(node = %node_id, "Variable node was not inserted");
    }
}

// =============================================================================
// Publish Loop
// =============================================================================

/// Registers the periodic buffer → address space push.
///
/// Entries are compared by `update_count`, so unchanged tags cost one
/// map lookup per tick and quality-only transitions still propagate.
fn install_publish_action(
    server: &mut Server,
    config: &OpcUaServerConfig,
    buffer: Arc<DataBuffer>,
    nodes: Arc<HashMap<TagId, NodeId>>,
) {
    let address_space = server.address_space();
    let published: Mutex<HashMap<TagId, u64>> = Mutex::new(HashMap::new());

    server.add_polling_action(config.publish_interval_ms, move || {
        let snapshot = buffer.snapshot();
        let mut published = published.lock();
        let mut address_space = address_space.write();
        let now = DateTime::now();

        for (tag_id, live) in snapshot {
            let Some(node_id) = nodes.get(&tag_id) else {
                continue;
            };
            if published.get(&tag_id).copied() == Some(live.update_count) {
                continue;
            }
            if let Some(node) = address_space.find_variable_mut(node_id) {
                let source = DateTime::from(live.timestamp);
                let _ = node.set_value_direct(
                    value_to_variant(&live.value),
                    quality_status(&live.quality),
                    &now,
                    &source,
                );
                published.insert(tag_id, live.update_count);
            }
        }
    });
}
