use anyhow::{Context, ensure};
use pnet::packet::dns::{DnsClass, DnsQuery, DnsType, DnsTypes, MutableDnsPacket, Opcode, Retcode};

pub const DNS_HDR_LEN: usize = 12;

/// Largest DNS answer read back through a relay.
pub const MAX_DNS_RESPONSE_LEN: usize = 1024;

const CLASS_IN: DnsClass = DnsClass(1);

/// Builds a recursive standard query for the A record of `name`.
pub fn create_a_query(name: &str, id: u16) -> anyhow::Result<Vec<u8>> {
    create_query_packet(name, DnsTypes::A, id)
}

pub fn create_query_packet(name: &str, qtype: DnsType, id: u16) -> anyhow::Result<Vec<u8>> {
    let query: DnsQuery = create_query(name, qtype)?;
    let q_fixed_len: usize = 4;
    let qlen: usize = query.qname.len() + q_fixed_len;
    let total: usize = DNS_HDR_LEN + qlen;
    let mut buffer: Vec<u8> = vec![0u8; total];

    {
        let mut dns: MutableDnsPacket =
            MutableDnsPacket::new(&mut buffer).context("creating dns header")?;
        dns.set_id(id);
        dns.set_is_response(0);
        dns.set_opcode(Opcode::StandardQuery);
        dns.set_is_authoriative(0);
        dns.set_is_truncated(0);
        dns.set_is_recursion_desirable(1);
        dns.set_is_recursion_available(0);
        dns.set_zero_reserved(0);
        dns.set_is_non_authenticated_data(0);
        dns.set_rcode(Retcode::NoError);
        dns.set_query_count(1);
        dns.set_response_count(0);
        dns.set_authority_rr_count(0);
        dns.set_additional_rr_count(0);
    }

    let mut cursor: usize = DNS_HDR_LEN;

    buffer[cursor..cursor + query.qname.len()].copy_from_slice(&query.qname);
    cursor += query.qname.len();

    buffer[cursor..cursor + 2].copy_from_slice(&query.qtype.0.to_be_bytes());
    cursor += 2;

    buffer[cursor..cursor + 2].copy_from_slice(&query.qclass.0.to_be_bytes());

    Ok(buffer)
}

/// Checks that `payload` answers query `id` with at least one record.
///
/// Returns the number of answer records.
pub fn check_answer(payload: &[u8], id: u16) -> anyhow::Result<usize> {
    let packet = dns_parser::Packet::parse(payload).context("failed to parse DNS response")?;
    ensure!(!packet.header.query, "DNS message is a query, not a response");
    ensure!(
        packet.header.id == id,
        "DNS response id {} does not match query id {id}",
        packet.header.id
    );
    ensure!(!packet.answers.is_empty(), "no answer");
    Ok(packet.answers.len())
}

fn create_query(name: &str, qtype: DnsType) -> anyhow::Result<DnsQuery> {
    let qname: Vec<u8> = encode_dns_name(name)?;
    Ok(DnsQuery {
        qname,
        qtype,
        qclass: CLASS_IN,
        payload: Vec::new(),
    })
}

fn encode_dns_name(name: &str) -> anyhow::Result<Vec<u8>> {
    let mut encoded: Vec<u8> = Vec::new();
    for label in name.split('.') {
        if label.is_empty() {
            continue;
        }
        ensure!(label.len() < 64, "DNS label '{label}' is longer than 63 bytes");
        encoded.push(label.len() as u8);
        encoded.extend_from_slice(label.as_bytes());
    }
    encoded.push(0);
    Ok(encoded)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
