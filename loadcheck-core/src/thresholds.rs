use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<String>,
}

impl ThresholdSet {
    pub fn new(metric: impl Into<String>, expressions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            metric: metric.into(),
            expressions: expressions.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ThresholdOp {
    #[strum(to_string = "<")]
    Lt,
    #[strum(to_string = "<=")]
    Lte,
    #[strum(to_string = ">")]
    Gt,
    #[strum(to_string = ">=")]
    Gte,
    #[strum(to_string = "==")]
    Eq,
    #[strum(to_string = "!=")]
    Ne,
}

impl ThresholdOp {
    pub fn compare(self, left: f64, right: f64) -> bool {
        match self {
            ThresholdOp::Lt => left < right,
            ThresholdOp::Lte => left <= right,
            ThresholdOp::Gt => left > right,
            ThresholdOp::Gte => left >= right,
            ThresholdOp::Eq => left == right,
            ThresholdOp::Ne => left != right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Value,
    /// Percentile in `(0, 100]`.
    P(f64),
}

impl fmt::Display for ThresholdAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdAgg::Avg => f.write_str("avg"),
            ThresholdAgg::Min => f.write_str("min"),
            ThresholdAgg::Max => f.write_str("max"),
            ThresholdAgg::Med => f.write_str("med"),
            ThresholdAgg::Count => f.write_str("count"),
            ThresholdAgg::Rate => f.write_str("rate"),
            ThresholdAgg::Value => f.write_str("value"),
            ThresholdAgg::P(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.agg, self.op, self.value)
    }
}

/// Parses `agg op number`, e.g. `p(95) < 2000` or `rate>=0.99`. Whitespace is ignored.
pub fn parse_threshold_expr(raw: &str) -> Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::Ne),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("missing comparison operator in `{raw}`"))?;

    let (left, right) = (&s[..op_pos], &s[op_pos + op_len..]);
    if left.is_empty() || right.is_empty() {
        return Err(format!("expected `aggregation operator value`, got `{raw}`"));
    }

    let agg = parse_agg(left).ok_or_else(|| format!("unknown aggregation `{left}`"))??;
    let value: f64 = right
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| format!("invalid numeric value `{right}`"))?;

    Ok(ThresholdExpr { agg, op, value })
}

fn parse_agg(left: &str) -> Option<Result<ThresholdAgg, String>> {
    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        "value" => ThresholdAgg::Value,
        other => {
            let inner = other.strip_prefix("p(")?.strip_suffix(')')?;
            return Some(parse_percentile(inner).map(ThresholdAgg::P));
        }
    };
    Some(Ok(agg))
}

fn parse_percentile(inner: &str) -> Result<f64, String> {
    let p: f64 = inner
        .parse()
        .map_err(|_| format!("invalid percentile `{inner}`"))?;
    if !(p > 0.0 && p <= 100.0) {
        return Err(format!("percentile {inner} is outside (0, 100]"));
    }
    Ok(p)
}
