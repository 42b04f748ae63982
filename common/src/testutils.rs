use std::os::unix::fs::PermissionsExt;

pub fn create_file(
    path: &std::path::Path,
    content: impl AsRef<[u8]>,
    mode: u32,
) -> std::io::Result<()> {
    std::fs::write(path, content)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

pub fn file_mode(path: &std::path::Path) -> std::io::Result<u32> {
    Ok(std::fs::symlink_metadata(path)?.permissions().mode() & 0o7777)
}

/// Creates the following tree under `root` and returns the path of `a`:
///
/// a
/// |- x.txt      "hi", 0644
/// |- sub
///    |- y.txt   "bye", 0600
/// |- empty
/// |- link -> x.txt
pub fn setup_test_tree(root: &std::path::Path) -> std::io::Result<std::path::PathBuf> {
    let a_path = root.join("a");
    std::fs::create_dir(&a_path)?;
    create_file(&a_path.join("x.txt"), "hi", 0o644)?;
    let sub_path = a_path.join("sub");
    std::fs::create_dir(&sub_path)?;
    create_file(&sub_path.join("y.txt"), "bye", 0o600)?;
    std::fs::create_dir(a_path.join("empty"))?;
    std::os::unix::fs::symlink("x.txt", a_path.join("link"))?;
    Ok(a_path)
}

/// Creates `count` small files directly under `dir`.
pub fn create_files(dir: &std::path::Path, count: usize) -> std::io::Result<()> {
    for i in 0..count {
        create_file(&dir.join(format!("{i}.txt")), i.to_string(), 0o644)?;
    }
    Ok(())
}
