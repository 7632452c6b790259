use basalt::search;
use basalt::uci::UciHandler;

fn main() {
    search::init_tables();
    UciHandler::new().run();
}
