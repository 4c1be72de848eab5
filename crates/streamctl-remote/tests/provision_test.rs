//! Provisioner behavior against a local "remote" rooted in a temp dir.

use std::sync::Arc;
use std::time::Duration;

use streamctl_common::Error;
use streamctl_db::models::{NewVideo, Server, Tenant};
use streamctl_db::pool::{get_conn, init_memory_pool, DbPool};
use streamctl_db::queries::{folders, servers, tenants, videos};
use streamctl_remote::{
    ConnectionManager, Layout, LocalTransport, ManagerOptions, Provisioner, RetryPolicy,
};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    root: String,
    db: DbPool,
    server: Server,
    tenant: Tenant,
    provisioner: Provisioner,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap().to_string();
    let db = init_memory_pool().unwrap();

    let (server, tenant) = {
        let conn = get_conn(&db).unwrap();
        let server = servers::create_server(
            &conn,
            &servers::NewServer {
                name: "local".into(),
                host: "127.0.0.1".into(),
                ssh_port: 22,
                ssh_user: "streaming".into(),
                ssh_password: None,
                ssh_key_path: None,
                http_port: 8086,
                max_tenants: 10,
            },
        )
        .unwrap();
        let tenant = tenants::create_tenant(
            &conn,
            server.id,
            &tenants::NewTenant {
                login: "radio1".into(),
                storage_limit_bytes: 1000,
                ..Default::default()
            },
        )
        .unwrap();
        (server, tenant)
    };

    let manager = Arc::new(ConnectionManager::new(
        Arc::new(LocalTransport::new()),
        ManagerOptions {
            retry_delay: Duration::from_millis(1),
            ..Default::default()
        },
    ));
    let provisioner = Provisioner::new(
        manager,
        db.clone(),
        Layout {
            content_root: root.clone(),
            tenant_subdirs: vec!["recordings".into(), "playlists".into()],
        },
    )
    .with_verify_policy(RetryPolicy::new(2, Duration::from_millis(1)));

    Fixture {
        _dir: dir,
        root,
        db,
        server,
        tenant,
        provisioner,
    }
}

#[tokio::test]
async fn tenant_root_is_idempotent() {
    let f = fixture();
    let root = f.provisioner.ensure_tenant_root(&f.server, "radio1").await.unwrap();
    f.provisioner.ensure_tenant_root(&f.server, "radio1").await.unwrap();

    assert_eq!(root, format!("{}/radio1", f.root));
    assert!(std::path::Path::new(&root).join("recordings").is_dir());
    assert!(std::path::Path::new(&root).join("playlists").is_dir());
}

#[tokio::test]
async fn folder_collision_is_case_insensitive() {
    let f = fixture();
    f.provisioner.ensure_tenant_root(&f.server, "radio1").await.unwrap();

    let folder = f
        .provisioner
        .ensure_folder(&f.server, &f.tenant, "Morning Shows")
        .await
        .unwrap();
    assert_eq!(folder.sanitized_name, "Morning_Shows");
    assert!(std::path::Path::new(&f.root).join("radio1/Morning_Shows").is_dir());

    let err = f
        .provisioner
        .ensure_folder(&f.server, &f.tenant, "morning shows")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn failed_mkdir_rolls_back_row() {
    let f = fixture();
    // A regular file where the tenant root should be makes mkdir fail.
    std::fs::write(std::path::Path::new(&f.root).join("radio1"), b"x").unwrap();

    let err = f
        .provisioner
        .ensure_folder(&f.server, &f.tenant, "shows")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RemoteStateMismatch(_)));

    let conn = get_conn(&f.db).unwrap();
    assert!(folders::list_folders(&conn, f.tenant.id).unwrap().is_empty());
}

#[tokio::test]
async fn delete_refused_when_store_has_videos() {
    let f = fixture();
    let folder = f
        .provisioner
        .ensure_folder(&f.server, &f.tenant, "shows")
        .await
        .unwrap();
    {
        let conn = get_conn(&f.db).unwrap();
        videos::create_video(
            &conn,
            f.tenant.id,
            folder.id,
            &NewVideo {
                file_name: "a.mp4".into(),
                remote_path: format!("{}/radio1/shows/a.mp4", f.root),
                ..Default::default()
            },
        )
        .unwrap();
    }

    let err = f
        .provisioner
        .delete_folder(&f.server, &f.tenant, folder.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn delete_refused_when_remote_has_files() {
    let f = fixture();
    let folder = f
        .provisioner
        .ensure_folder(&f.server, &f.tenant, "shows")
        .await
        .unwrap();
    // Untracked file: the store count is zero but the remote is not empty.
    std::fs::write(
        std::path::Path::new(&f.root).join("radio1/shows/stray.mp4"),
        b"data",
    )
    .unwrap();

    let err = f
        .provisioner
        .delete_folder(&f.server, &f.tenant, folder.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(ref m) if m.contains("remote")));
    assert!(std::path::Path::new(&f.root)
        .join("radio1/shows/stray.mp4")
        .exists());

    let conn = get_conn(&f.db).unwrap();
    assert!(folders::get_folder(&conn, folder.id).unwrap().is_some());
}

#[tokio::test]
async fn delete_empty_folder() {
    let f = fixture();
    let folder = f
        .provisioner
        .ensure_folder(&f.server, &f.tenant, "shows")
        .await
        .unwrap();

    f.provisioner
        .delete_folder(&f.server, &f.tenant, folder.id)
        .await
        .unwrap();

    assert!(!std::path::Path::new(&f.root).join("radio1/shows").exists());
    let conn = get_conn(&f.db).unwrap();
    assert!(folders::get_folder(&conn, folder.id).unwrap().is_none());
}

#[tokio::test]
async fn rename_moves_directory_and_rewrites_paths() {
    let f = fixture();
    let folder = f
        .provisioner
        .ensure_folder(&f.server, &f.tenant, "old")
        .await
        .unwrap();
    let old_file = format!("{}/radio1/old/a.mp4", f.root);
    std::fs::write(&old_file, b"video").unwrap();
    let video = {
        let conn = get_conn(&f.db).unwrap();
        videos::create_video(
            &conn,
            f.tenant.id,
            folder.id,
            &NewVideo {
                file_name: "a.mp4".into(),
                remote_path: old_file.clone(),
                ..Default::default()
            },
        )
        .unwrap()
    };

    let renamed = f
        .provisioner
        .rename_folder(&f.server, &f.tenant, folder.id, "New Name")
        .await
        .unwrap();
    assert_eq!(renamed.sanitized_name, "New_Name");
    assert!(std::path::Path::new(&f.root).join("radio1/New_Name/a.mp4").is_file());

    let conn = get_conn(&f.db).unwrap();
    let video = videos::get_video(&conn, video.id).unwrap().unwrap();
    assert_eq!(video.remote_path, format!("{}/radio1/New_Name/a.mp4", f.root));
}

#[tokio::test]
async fn usage_comes_from_remote() {
    let f = fixture();
    let folder = f
        .provisioner
        .ensure_folder(&f.server, &f.tenant, "shows")
        .await
        .unwrap();
    std::fs::write(
        std::path::Path::new(&f.root).join("radio1/shows/a.mp4"),
        vec![0u8; 4096],
    )
    .unwrap();

    let summary = f.provisioner.tenant_usage(&f.server, &f.tenant).await.unwrap();
    assert_eq!(summary.folders.len(), 1);
    assert!(summary.folders[0].fresh);
    assert!(summary.used_bytes >= 4096);
    assert_eq!(summary.limit_bytes, 1000);
    assert!(summary.percent.unwrap() > 100.0);

    let conn = get_conn(&f.db).unwrap();
    let cached = folders::get_folder(&conn, folder.id).unwrap().unwrap();
    assert_eq!(cached.usage_bytes as u64, summary.folders[0].bytes);
}
