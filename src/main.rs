fn main() {
    limber_lib::run()
}
