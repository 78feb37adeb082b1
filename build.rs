use vergen::EmitBuilder;

fn main() {
    // 生成构建信息（构建时间戳，启动日志中输出）
    EmitBuilder::builder()
        .all_build()
        .emit()
        .expect("Failed to generate build information");
}
