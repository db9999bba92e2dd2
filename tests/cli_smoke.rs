use std::path::PathBuf;

fn bin() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_coinjar")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "coinjar.exe"
            } else {
                "coinjar"
            });
            p
        })
}

#[test]
fn cli_add_then_render_writes_png() {
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();

    let store_path = dir.join("entries.json");
    let out_path = dir.join("jar.png");
    let _ = std::fs::remove_file(&store_path);
    let _ = std::fs::remove_file(&out_path);

    let store_arg = store_path.to_string_lossy().to_string();
    let out_arg = out_path.to_string_lossy().to_string();

    let status = std::process::Command::new(bin())
        .args([
            "--store",
            store_arg.as_str(),
            "add",
            "--category",
            "Chaos Coin",
            "--text",
            "the deploy is the test environment",
        ])
        .status()
        .unwrap();
    assert!(status.success());
    assert!(store_path.exists());

    let status = std::process::Command::new(bin())
        .args(["--store", store_arg.as_str(), "render", "--out"])
        .arg(out_arg.as_str())
        .status()
        .unwrap();
    assert!(status.success());
    assert!(out_path.exists());
}

#[test]
fn cli_rejects_unknown_category() {
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();
    let store_path = dir.join("entries_bad_cat.json");
    let _ = std::fs::remove_file(&store_path);
    let store_arg = store_path.to_string_lossy().to_string();

    let output = std::process::Command::new(bin())
        .args([
            "--store",
            store_arg.as_str(),
            "add",
            "--category",
            "Not A Category",
            "--text",
            "should fail",
        ])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(!store_path.exists(), "failed add must not create a snapshot");
}
