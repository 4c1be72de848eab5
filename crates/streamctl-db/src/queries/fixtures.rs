//! Shared fixtures for query tests.

use rusqlite::Connection;

use crate::models::{Folder, Server, Tenant};
use crate::queries::{folders, servers, tenants};

pub(crate) fn sample_server() -> servers::NewServer {
    servers::NewServer {
        name: "edge-1".into(),
        host: "10.0.0.5".into(),
        ssh_port: 22,
        ssh_user: "root".into(),
        ssh_password: Some("secret".into()),
        ssh_key_path: None,
        http_port: 8086,
        max_tenants: 50,
    }
}

pub(crate) fn server_and_tenant(conn: &Connection, login: &str) -> (Server, Tenant) {
    let server = servers::create_server(conn, &sample_server()).unwrap();
    let tenant = tenants::create_tenant(
        conn,
        server.id,
        &tenants::NewTenant {
            login: login.into(),
            ..Default::default()
        },
    )
    .unwrap();
    (server, tenant)
}

pub(crate) fn folder(conn: &Connection, tenant: &Tenant, name: &str) -> Folder {
    folders::create_folder(conn, tenant.id, tenant.server_id, name, name).unwrap()
}
