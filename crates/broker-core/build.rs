fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("PROTOC", protobuf_src::protoc());

    prost_build::compile_protos(&["proto/cellaserv.proto"], &["proto"])?;
    println!("cargo:rerun-if-changed=proto/cellaserv.proto");

    Ok(())
}
