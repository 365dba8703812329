use std::env;
use std::fs;
use std::path::Path;

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).parent().unwrap().parent().unwrap().parent().unwrap();

    // Copy packer_rules.json to the target directory
    fs::copy("packer_rules.json", dest_path.join("packer_rules.json"))
        .expect("Failed to copy packer_rules.json to target directory");
}
