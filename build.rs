fn main() {
    println!("cargo:rerun-if-changed=protobuf/cast_channel.proto");

    protobuf_codegen::Codegen::new()
        .pure()
        .include("protobuf")
        .input("protobuf/cast_channel.proto")
        .cargo_out_dir("protos")
        .run_from_script();
}
