fn main() {
    // ESP-IDF environment is only needed when cross-compiling for the panel controller
    if std::env::var("CARGO_CFG_TARGET_OS").is_ok_and(|os| os == "espidf") {
        embuild::espidf::sysenv::output();
    }
}
