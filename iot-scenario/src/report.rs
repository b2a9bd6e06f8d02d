use crate::config::RunConfig;
use crate::simulation::RunSummary;

pub fn print_params(config: &RunConfig) {
    let p = &config.populations;
    println!("--- Params ---");
    println!("* Routing protocol: {}", config.routing_protocol);
    println!("* Configuration name: {}", config.config_name);
    println!(
        "* Nodes: {} fixed, {} mobile, {} malicious, {} interfering",
        p.fixed, p.mobile, p.malicious, p.interfering
    );
    println!("* Simulated time: {} s", config.sim_time);
    println!("* Seed: {}", config.seed);
}

pub fn print_traffic_stats(summary: &RunSummary) {
    println!("--- Traffic ---");
    println!(
        "* Normal sink: {} packets received ({} logged)",
        summary.packets_received_normal, summary.packets_logged_normal
    );
    println!(
        "* Malicious sink: {} packets received ({} logged)",
        summary.packets_received_malicious, summary.packets_logged_malicious
    );
    println!("* Simulation events executed: {}", summary.executed_events);
}

pub fn print_metrics(summary: &RunSummary) {
    let Some(metrics) = &summary.metrics else {
        println!("--- Metrics ---");
        println!("* No metrics were computed");
        return;
    };

    let f = &metrics.flows;
    println!("--- Metrics ---");
    println!("* Flows: {}", f.flow_count);
    println!(
        "* Throughput: {:.3} kbps on average ({:.3} kbps in total)",
        f.avg_throughput_kbps, f.total_throughput_kbps
    );
    println!(
        "* Delay: {:.6} s on average (max {:.6} s, min {:.6} s)",
        f.avg_delay_s, f.max_delay_s, f.min_delay_s
    );
    println!("* Jitter: {:.6} s on average", f.avg_jitter_s);
    println!(
        "* Packets: {} sent, {} lost ({:.2}% loss, {:.2}% delivered)",
        f.total_packets, f.lost_packets, f.packet_loss_pct, f.pdr_pct
    );
}
