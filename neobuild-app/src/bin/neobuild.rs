pub fn main() {
    neobuild_app::app::launch()
}
