use std::io::{stdin, stdout, Write};

use anyhow::Result;
use cache_sim::sim::Simulator;

#[cfg(feature = "stat")]
use crate::get_terminal_width;

peg::parser!(grammar command() for str {
    rule address() -> u32
        = quiet!{("0" ['x' | 'X'])?} n:$(quiet!{['0'..='9' | 'a'..='f' | 'A'..='F']+}) {?
            u32::from_str_radix(n, 16).map_err(|_| "32-bit address")
        }
        / expected!("hexadecimal address")
    rule access() = "access" / "a"
    rule show_kind() -> ShowKind
        = "stat" "s"? { ShowKind::Stat }
        / "conf" "ig"? { ShowKind::Config }
        / ("cache" / "lines") { ShowKind::Cache }
        / "set" __ n:$(quiet!{['0'..='9']+}) {? n.parse().map(ShowKind::Set).map_err(|_| "set number") }
    pub(crate) rule parse_command() -> Command
        = _ "show" __ sk:show_kind() _ { Command::Show(sk) }
        / _ "show" _ { Command::Show(ShowKind::Cache) }
        / _ access() __ addrs:(address() ++ __) _ { Command::Access(addrs) }
        / _ ("exit" / "quit" / "q") _ { Command::Exit }
        / _ ("help" / "h") _ { Command::Help }
        / _ { Command::Nop }
        / expected!("command")

    rule ws() = quiet!{[' ' | '\t' | '\r' | '\n']}
        / expected!("whitespace")
    rule _() = ws()*
    rule __() = ws()+
});

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Access(Vec<u32>),
    Show(ShowKind),
    Help,
    Nop,
    Exit,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ShowKind {
    Cache,
    Set(usize),
    Config,
    Stat,
}

const HELP: &str = "\
commands:
    access|a <hex>...   access each address
    show [cache]        print every line
    show set <n>        print lines of set n
    show config         print cache configuration
    show stat           print statistics
    exit|quit|q         leave interactive mode";

pub fn execute_interactive(sim: &mut Simulator) -> Result<()> {
    #[cfg(feature = "stat")]
    let width = get_terminal_width();
    println!("entering interactive.");
    loop {
        print!("#{} > ", sim.cache().access_count());
        stdout().flush()?;
        let mut str = String::new();
        if stdin().read_line(&mut str)? == 0 {
            break;
        }
        let parsed = match command::parse_command(&str) {
            Ok(p) => p,
            Err(e) => {
                println!("parse error: expected {}", e.expected);
                continue;
            }
        };
        match parsed {
            Command::Access(addrs) => {
                for addr in addrs {
                    let o = sim.step(addr, &mut stdout().lock())?;
                    println!(
                        "{addr:#010x}: {} (block {}, set {}, line {:03})",
                        o.result, o.block, o.set, o.line
                    );
                    if let Some(evicted) = o.evicted {
                        println!("\tevicted {evicted}");
                    }
                }
            }
            Command::Show(ShowKind::Cache) => {
                print!("{}", sim.cache().snapshot());
            }
            Command::Show(ShowKind::Set(set)) => {
                let geometry = sim.cache().geometry();
                if set >= geometry.number_of_sets() {
                    println!("no set {set}; cache has {}", geometry.number_of_sets());
                    continue;
                }
                let begin = set * geometry.lines_per_set();
                for (i, line) in sim.cache().set_lines(set).iter().enumerate() {
                    match line.block() {
                        Some(b) => println!("{:03} {b}", begin + i),
                        None => println!("{:03} -", begin + i),
                    }
                }
                let order: Vec<_> = sim
                    .cache()
                    .eviction_order(set)
                    .map(|l| format!("{l:03}"))
                    .collect();
                println!("eviction order: [{}]", order.join(", "));
            }
            Command::Show(ShowKind::Config) => {
                println!("{}", sim.config());
            }
            #[cfg(feature = "stat")]
            Command::Show(ShowKind::Stat) => {
                println!("{}", sim.collect_stat().view(width.unwrap_or(60) as usize));
            }
            #[cfg(not(feature = "stat"))]
            Command::Show(ShowKind::Stat) => {
                println!("try compile with `--features stat`");
            }
            Command::Help => println!("{HELP}"),
            Command::Nop => (),
            Command::Exit => break,
        }
    }
    sim.exit_sim();
    println!("exiting interactive.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_access() {
        assert_eq!(
            Command::Access(vec![0x400, 0xdeadbeef, 0]),
            command::parse_command("access 0x400 DEADBEEF 0\n").unwrap()
        );
        assert_eq!(
            Command::Access(vec![0x10]),
            command::parse_command("  a 10  ").unwrap()
        );
        assert!(command::parse_command("a 100000000").is_err());
        assert!(command::parse_command("a").is_err());
    }

    #[test]
    fn test_parse_show() {
        assert_eq!(
            Command::Show(ShowKind::Cache),
            command::parse_command("show\n").unwrap()
        );
        assert_eq!(
            Command::Show(ShowKind::Stat),
            command::parse_command("show stat").unwrap()
        );
        assert_eq!(
            Command::Show(ShowKind::Config),
            command::parse_command("show config").unwrap()
        );
        assert_eq!(
            Command::Show(ShowKind::Set(3)),
            command::parse_command("show set 3").unwrap()
        );
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(Command::Exit, command::parse_command("q\n").unwrap());
        assert_eq!(Command::Exit, command::parse_command("exit").unwrap());
        assert_eq!(Command::Nop, command::parse_command("\n").unwrap());
        assert_eq!(Command::Help, command::parse_command("help").unwrap());
        assert!(command::parse_command("flush").is_err());
    }
}
