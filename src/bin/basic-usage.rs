use flexi_logger::{opt_format, Logger};
use log::{info, LevelFilter};
use num_complex::Complex64;

use tensornet::NumServer;

fn main() {
    let _logger = Logger::with(LevelFilter::Debug)
        .format(opt_format)
        .start()
        .expect("logger setup failed");

    let mut server = NumServer::new();
    server.create_vector_space("V", 4).expect("space creation");

    server.create_tensor("A", vec![2, 2]).unwrap();
    server.create_tensor("B", vec![2, 2]).unwrap();
    server.create_tensor("C", vec![2, 2]).unwrap();
    server
        .init_tensor_data(
            "A",
            vec![
                Complex64::new(1.0, 0.0),
                Complex64::new(2.0, 0.0),
                Complex64::new(3.0, 0.0),
                Complex64::new(4.0, 0.0),
            ],
        )
        .unwrap();
    server.init_tensor("B", Complex64::ONE).unwrap();

    server
        .contract_tensors("C(i,j)=A(i,k)*B(k,j)", Complex64::ONE)
        .unwrap();
    server.sync("C", true).unwrap();

    let result = server.get_local_tensor("C").unwrap();
    info!("C = {:?}", result.data);
}
