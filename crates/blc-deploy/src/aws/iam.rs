//! IAM policy statements.
//!
//! Grants are expressed on descriptors by reference and only become policy
//! statements once the referenced resources have ARNs.

/// Managed policy attached to every function's execution role.
pub const BASIC_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

const TABLE_READ_ACTIONS: &[&str] = &[
    "dynamodb:BatchGetItem",
    "dynamodb:ConditionCheckItem",
    "dynamodb:DescribeTable",
    "dynamodb:GetItem",
    "dynamodb:GetRecords",
    "dynamodb:GetShardIterator",
    "dynamodb:Query",
    "dynamodb:Scan",
];

const TABLE_WRITE_ACTIONS: &[&str] = &[
    "dynamodb:BatchWriteItem",
    "dynamodb:DeleteItem",
    "dynamodb:DescribeTable",
    "dynamodb:PutItem",
    "dynamodb:UpdateItem",
];

const SECRET_READ_ACTIONS: &[&str] = &[
    "secretsmanager:DescribeSecret",
    "secretsmanager:GetSecretValue",
];

const QUEUE_CONSUME_ACTIONS: &[&str] = &[
    "sqs:ChangeMessageVisibility",
    "sqs:DeleteMessage",
    "sqs:GetQueueAttributes",
    "sqs:GetQueueUrl",
    "sqs:ReceiveMessage",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Effect {
    Allow,
}

/// Level of access a function has on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum TableAccess {
    Read,
    Write,
    ReadWrite,
}

impl TableAccess {
    pub fn actions(&self) -> Vec<&'static str> {
        let mut actions = match self {
            TableAccess::Read => TABLE_READ_ACTIONS.to_vec(),
            TableAccess::Write => TABLE_WRITE_ACTIONS.to_vec(),
            TableAccess::ReadWrite => [TABLE_READ_ACTIONS, TABLE_WRITE_ACTIONS].concat(),
        };
        actions.sort_unstable();
        actions.dedup();
        actions
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: Effect,
    pub action: Vec<String>,
    pub resource: Vec<String>,
}

impl PolicyStatement {
    pub fn allow<'a>(
        actions: impl IntoIterator<Item = &'a str>,
        resources: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            effect: Effect::Allow,
            action: actions.into_iter().map(str::to_owned).collect(),
            resource: resources.into_iter().collect(),
        }
    }

    /// Access on a table and all of its indexes.
    pub fn table(access: TableAccess, table_arn: &str) -> Self {
        Self::allow(
            access.actions(),
            [table_arn.to_owned(), format!("{table_arn}/index/*")],
        )
    }

    /// Read access on every secret whose name starts with `name_prefix`.
    pub fn secret_read(region: &str, account: &str, name_prefix: &str) -> Self {
        Self::allow(
            SECRET_READ_ACTIONS.iter().copied(),
            [format!(
                "arn:aws:secretsmanager:{region}:{account}:secret:{name_prefix}*"
            )],
        )
    }

    pub fn queue_consume(queue_arn: &str) -> Self {
        Self::allow(QUEUE_CONSUME_ACTIONS.iter().copied(), [queue_arn.to_owned()])
    }
}

/// A policy document as accepted by IAM.
pub fn policy_document(statements: &[PolicyStatement]) -> serde_json::Value {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": statements,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn read_write_is_a_union() {
        let rw = TableAccess::ReadWrite.actions();
        for action in TableAccess::Read.actions() {
            assert!(rw.contains(&action));
        }
        for action in TableAccess::Write.actions() {
            assert!(rw.contains(&action));
        }
        assert_eq!(
            1,
            rw.iter()
                .filter(|action| **action == "dynamodb:DescribeTable")
                .count()
        );
        assert!(!TableAccess::Read.actions().contains(&"dynamodb:PutItem"));
    }

    #[test]
    fn secret_statement_is_scoped_to_prefix() {
        let statement = PolicyStatement::secret_read("us-east-1", "111", "baselayercapital/PEPPER");
        assert_eq!(
            vec!["arn:aws:secretsmanager:us-east-1:111:secret:baselayercapital/PEPPER*".to_owned()],
            statement.resource
        );
    }

    #[test]
    fn document_shape() {
        let doc = policy_document(&[PolicyStatement::queue_consume("arn:q")]);
        assert_eq!("2012-10-17", doc["Version"]);
        assert_eq!("Allow", doc["Statement"][0]["Effect"]);
        assert_eq!("arn:q", doc["Statement"][0]["Resource"][0]);
    }
}
