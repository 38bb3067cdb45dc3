fn main() {
    #[cfg(feature = "limesdr")]
    {
        println!("cargo:rustc-link-lib=LimeSuite");
    }
}
