use glob::glob;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let protos = glob("protos/**/*.proto")?
        .collect::<Result<Vec<_>, _>>()?;
    let protoc = protoc_bin_vendored::protoc_bin_path().map_err(|e| format!("{:?}", e))?;
    let well_known = protoc_bin_vendored::include_path().map_err(|e| format!("{:?}", e))?;
    prost_build::Config::new()
        .protoc_executable(protoc)
        .compile_protos(&protos, &[std::path::PathBuf::from("protos"), well_known])?;
    println!("cargo:rerun-if-changed=protos");
    Ok(())
}
